use log::{debug, info};
use rand::Rng;

use crate::{
    config::policy::PrivacyPolicy,
    errors::SpecError,
    events::source::Source,
    privacy::combinatorics::StateCounter,
    reports::{
        event_report::{DebugKeyPair, DebugReportStatus, EventReport, ReportFields},
        traits::{NoiseHandler, ReportWindowCalculator},
    },
};

/// Randomized response over a source's output states.
///
/// Flexible sources use the flip probability cached on their report spec.
/// Other sources use the per-source-type rate from the policy, over the state
/// space of their default windows and cardinality.
#[derive(Debug, Clone, Default)]
pub struct SourceNoiseHandler {
    policy: PrivacyPolicy,
}

impl SourceNoiseHandler {
    pub fn new(policy: PrivacyPolicy) -> Self {
        Self { policy }
    }

    fn state_counter<W>(
        &self,
        source: &Source,
        windows: &W,
    ) -> Result<StateCounter, SpecError>
    where
        W: ReportWindowCalculator + ?Sized,
    {
        if let Some(spec) = source.report_spec() {
            return StateCounter::new(
                spec.max_event_level_reports(),
                spec.per_type_num_windows(),
                spec.per_type_caps(),
                &self.policy,
            );
        }

        let cardinality = source.trigger_data_cardinality(&self.policy) as usize;
        let max_reports = source.max_event_level_reports(&self.policy);
        let num_windows = windows
            .report_windows(source, 0, source.primary_destination_type())
            .len() as u32;
        StateCounter::new(
            max_reports,
            vec![num_windows; cardinality],
            vec![max_reports; cardinality],
            &self.policy,
        )
    }

    fn fake_trigger_data(source: &Source, index: usize) -> u64 {
        match source.report_spec().and_then(|spec| spec.trigger_data_value(index)) {
            Some(value) => u64::from(value),
            None => index as u64,
        }
    }
}

impl NoiseHandler for SourceNoiseHandler {
    fn randomized_trigger_rate(&self, source: &Source) -> f64 {
        match source.report_spec() {
            Some(spec) => spec.privacy_params().flip_probability(),
            None => self.policy.default_noise_probability(source.source_type()),
        }
    }

    fn fake_reports<W, R>(
        &self,
        source: &Source,
        windows: &W,
        rng: &mut R,
    ) -> Result<Option<Vec<EventReport>>, SpecError>
    where
        W: ReportWindowCalculator + ?Sized,
        R: Rng + ?Sized,
    {
        let rate = self.randomized_trigger_rate(source);
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        if !rng.gen_bool(rate) {
            return Ok(None);
        }

        let mut counter = self.state_counter(source, windows)?;
        let num_states = counter.num_states()?;
        let rank = rng.gen_range(0..num_states);
        let state = counter.state_at(rank)?;
        debug!(
            "Source {} drew random state {} of {}",
            source.id(),
            rank,
            num_states
        );

        let destination_type = source.primary_destination_type();
        let mut reports = vec![];
        for (index, per_window) in state.iter().enumerate() {
            let trigger_data = Self::fake_trigger_data(source, index);
            let report_windows =
                windows.report_windows(source, trigger_data, destination_type);
            for (window_index, count) in per_window.iter().enumerate() {
                let Some(window) = report_windows.get(window_index) else {
                    continue;
                };
                for _ in 0..*count {
                    reports.push(EventReport::new(
                        source,
                        ReportFields {
                            trigger_id: None,
                            attribution_destinations: source
                                .destinations(destination_type)
                                .to_vec(),
                            destination_type,
                            trigger_data,
                            trigger_priority: 0,
                            trigger_dedup_key: None,
                            trigger_time: window.start,
                            report_time: windows.report_time(source, window),
                            randomized_trigger_rate: rate,
                            debug_report_status: DebugReportStatus::None,
                            debug_keys: DebugKeyPair::default(),
                        },
                    ));
                }
            }
        }

        info!(
            "Source {} reports falsely with {} fake reports",
            source.id(),
            reports.len()
        );
        Ok(Some(reports))
    }
}
