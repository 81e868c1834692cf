use crate::{
    config::policy::PrivacyPolicy,
    events::source::{DestinationType, Source, SourceType},
    reports::traits::{ReportWindow, ReportWindowCalculator},
};

const MILLIS_PER_SECOND: u64 = 1000;

/// Report windows following the Attribution Reporting API defaults.
///
/// Flexible sources use the windows of the trigger spec covering the trigger
/// data. Other sources get early windows by source type (2 and 7 days for
/// navigation sources, 2 days for install-attributed event sources towards an
/// app) and a final window ending at the source's event report window. Early
/// windows that do not end before it are dropped.
#[derive(Debug, Clone, Default)]
pub struct DefaultReportWindows {
    policy: PrivacyPolicy,
}

impl DefaultReportWindows {
    pub fn new(policy: PrivacyPolicy) -> Self {
        Self { policy }
    }

    fn early_window_offsets(
        &self,
        source: &Source,
        destination_type: DestinationType,
    ) -> &[u64] {
        match source.source_type() {
            SourceType::Navigation => {
                &self.policy.navigation_early_windows_seconds
            }
            SourceType::Event
                if source.is_install_attributed()
                    && destination_type == DestinationType::App =>
            {
                &self.policy.install_attributed_event_early_windows_seconds
            }
            SourceType::Event => &[],
        }
    }
}

impl ReportWindowCalculator for DefaultReportWindows {
    fn report_windows(
        &self,
        source: &Source,
        trigger_data: u64,
        destination_type: DestinationType,
    ) -> Vec<ReportWindow> {
        let event_time = source.event_time();
        let last_end = source.event_report_window();

        let flexible_windows = source.report_spec().and_then(|spec| {
            let value = u32::try_from(trigger_data).ok()?;
            spec.spec_for_trigger_data(value)
        });

        if let Some(trigger_spec) = flexible_windows {
            let windows = trigger_spec.event_report_windows();
            let mut start = event_time.saturating_add(
                windows.start_time().saturating_mul(MILLIS_PER_SECOND),
            );
            // Windows keep their indices; those cut by the event report
            // window end up empty.
            return windows
                .end_times()
                .iter()
                .map(|end_seconds| {
                    let end = event_time
                        .saturating_add(
                            end_seconds.saturating_mul(MILLIS_PER_SECOND),
                        )
                        .min(last_end);
                    let window = ReportWindow {
                        start: start.min(end),
                        end,
                    };
                    start = end;
                    window
                })
                .collect();
        }

        let mut windows = vec![];
        let mut start = event_time;
        for offset in self.early_window_offsets(source, destination_type) {
            let end = event_time
                .saturating_add(offset.saturating_mul(MILLIS_PER_SECOND));
            if end >= last_end {
                break;
            }
            windows.push(ReportWindow { start, end });
            start = end;
        }
        windows.push(ReportWindow {
            start,
            end: last_end,
        });
        windows
    }

    fn report_time(&self, _source: &Source, window: &ReportWindow) -> u64 {
        window.end.saturating_add(
            self.policy
                .report_delivery_delay_seconds
                .saturating_mul(MILLIS_PER_SECOND),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::source::SourceRegistration;

    const DAY: u64 = 86_400_000;
    const HOUR: u64 = 3_600_000;

    fn source(registration: SourceRegistration) -> Source {
        Source::register(registration, &PrivacyPolicy::default()).unwrap()
    }

    #[test]
    fn test_navigation_windows() {
        let source = source(SourceRegistration::mock());
        let calculator = DefaultReportWindows::default();
        let windows =
            calculator.report_windows(&source, 0, DestinationType::App);
        let t = source.event_time();
        assert_eq!(
            windows,
            vec![
                ReportWindow { start: t, end: t + 2 * DAY },
                ReportWindow { start: t + 2 * DAY, end: t + 7 * DAY },
                ReportWindow {
                    start: t + 7 * DAY,
                    end: source.event_report_window()
                },
            ]
        );

        assert_eq!(
            calculator.reporting_time(&source, t + DAY, 0, DestinationType::App),
            Some(t + 2 * DAY + HOUR)
        );
        assert_eq!(
            calculator.reporting_time(
                &source,
                t + 3 * DAY,
                0,
                DestinationType::Web
            ),
            Some(t + 7 * DAY + HOUR)
        );
        assert_eq!(
            calculator.reporting_time(
                &source,
                source.expiry_time(),
                0,
                DestinationType::App
            ),
            None
        );
    }

    #[test]
    fn test_event_windows() {
        let mock = SourceRegistration::mock();
        let plain = source(SourceRegistration {
            source_type: SourceType::Event,
            ..mock.clone()
        });
        let calculator = DefaultReportWindows::default();
        assert_eq!(
            calculator
                .report_windows(&plain, 0, DestinationType::App)
                .len(),
            1
        );

        let installed = source(SourceRegistration {
            source_type: SourceType::Event,
            install_attributed: true,
            ..mock
        });
        assert_eq!(
            calculator
                .report_windows(&installed, 0, DestinationType::App)
                .len(),
            2
        );
        assert_eq!(
            calculator
                .report_windows(&installed, 0, DestinationType::Web)
                .len(),
            1
        );
    }

    #[test]
    fn test_early_windows_dropped_past_report_window() {
        let mock = SourceRegistration::mock();
        let source = source(SourceRegistration {
            event_report_window: Some(mock.event_time + 3 * DAY),
            ..mock
        });
        let windows = DefaultReportWindows::default().report_windows(
            &source,
            0,
            DestinationType::App,
        );
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end, source.event_time() + 3 * DAY);
    }

    #[test]
    fn test_flexible_windows() {
        let source = source(SourceRegistration {
            trigger_specs: Some(
                r#"[{"trigger_data": [1, 2], "event_report_windows": {"start_time": 1800, "end_times": [3600, 86400]}},
                    {"trigger_data": [5], "event_report_windows": {"end_times": [172800]}}]"#
                    .to_string(),
            ),
            max_event_level_reports: Some(2),
            ..SourceRegistration::mock()
        });
        let calculator = DefaultReportWindows::default();
        let t = source.event_time();

        let windows =
            calculator.report_windows(&source, 2, DestinationType::App);
        assert_eq!(
            windows,
            vec![
                ReportWindow { start: t + HOUR / 2, end: t + HOUR },
                ReportWindow { start: t + HOUR, end: t + DAY },
            ]
        );
        assert_eq!(
            calculator.reporting_time(&source, t, 2, DestinationType::App),
            None
        );

        let windows =
            calculator.report_windows(&source, 5, DestinationType::App);
        assert_eq!(windows, vec![ReportWindow { start: t, end: t + 2 * DAY }]);
    }
}
