use anyhow::Result;
use log::{debug, info};
use rand::Rng;

use crate::{
    config::policy::PrivacyPolicy,
    errors::{RegistrationError, ReportError},
    events::{
        source::{AttributionMode, Source, SourceRegistration, SourceStatus},
        trigger::{EventTrigger, Trigger, TriggerRegistration, TriggerStatus},
    },
    filtering::evaluator::is_eligible,
    reports::{
        builder::build_event_report,
        event_report::{EventReport, EventReportStatus},
        noise::SourceNoiseHandler,
        report_windows::DefaultReportWindows,
        traits::{NoiseHandler, ReportWindowCalculator},
    },
    storage::traits::{MeasurementStore, MeasurementTables},
};

/// A validated source and the fake reports randomized response chose for it.
#[derive(Debug, Clone)]
pub struct RegisteredSource {
    pub source: Source,
    pub fake_reports: Vec<EventReport>,
}

/// Why a trigger produced no event report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NoMatchingSource,
    SourceNotActive,
    DestinationMismatch,
    FilterMismatch,
    NoMatchingEventTrigger,

    /// The source reports fake data, or nothing, instead of the truth.
    NoisedSource,

    Deduplicated,
    OutsideReportWindows,
    ReportCapReached,
    TriggerDataCapReached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributionOutcome {
    Attributed {
        report: EventReport,

        /// Id of a lower-priority pending report the new one displaces.
        replaced: Option<String>,
    },
    Dropped(DropReason),
}

/// Event-level attribution over explicit policy and collaborators.
#[derive(Debug, Clone)]
pub struct AttributionEngine<W = DefaultReportWindows, N = SourceNoiseHandler> {
    policy: PrivacyPolicy,
    windows: W,
    noise: N,
}

impl AttributionEngine {
    pub fn with_defaults(policy: PrivacyPolicy) -> Self {
        Self {
            windows: DefaultReportWindows::new(policy.clone()),
            noise: SourceNoiseHandler::new(policy.clone()),
            policy,
        }
    }
}

impl<W, N> AttributionEngine<W, N>
where
    W: ReportWindowCalculator,
    N: NoiseHandler,
{
    pub fn new(policy: PrivacyPolicy, windows: W, noise: N) -> Self {
        Self {
            policy,
            windows,
            noise,
        }
    }

    pub fn policy(&self) -> &PrivacyPolicy {
        &self.policy
    }

    /// Validates a source, compiles its report spec and runs randomized
    /// response once. The attribution mode is fixed here for the source's
    /// whole life.
    pub fn register_source<R: Rng + ?Sized>(
        &self,
        registration: SourceRegistration,
        rng: &mut R,
    ) -> Result<RegisteredSource, RegistrationError> {
        let source = Source::register(registration, &self.policy)?;
        let (mode, fake_reports) =
            match self.noise.fake_reports(&source, &self.windows, rng)? {
                None => (AttributionMode::Truthfully, vec![]),
                Some(reports) if reports.is_empty() => {
                    (AttributionMode::Never, reports)
                }
                Some(reports) => (AttributionMode::Falsely, reports),
            };
        Ok(RegisteredSource {
            source: source.with_attribution_mode(mode),
            fake_reports,
        })
    }

    pub fn register_trigger(
        &self,
        registration: TriggerRegistration,
    ) -> Result<Trigger, RegistrationError> {
        Trigger::register(registration, &self.policy)
    }

    /// Whether the trigger is addressed to this source: same enrollment, a
    /// declared destination, and within the source's lifetime.
    pub fn is_source_matching(&self, source: &Source, trigger: &Trigger) -> bool {
        source.enrollment_id() == trigger.enrollment_id()
            && source
                .destinations(trigger.destination_type())
                .iter()
                .any(|d| d == trigger.attribution_destination())
            && source.event_time() <= trigger.trigger_time()
            && trigger.trigger_time() < source.expiry_time()
    }

    /// First event trigger whose own filters accept the source.
    fn select_event_trigger<'a>(
        &self,
        source: &Source,
        trigger: &'a Trigger,
    ) -> Result<Option<&'a EventTrigger>, ReportError> {
        let filter_map = source.filter_map(&self.policy)?;
        let elapsed_seconds = elapsed_seconds(source, trigger);
        Ok(trigger.event_triggers().iter().find(|event_trigger| {
            is_eligible(
                &filter_map,
                event_trigger.filter_set(),
                event_trigger.not_filter_set(),
                elapsed_seconds,
            )
        }))
    }

    /// Attributes `trigger` to `source`, given the reports the source already
    /// produced. On success the event trigger's dedup key is recorded on the
    /// source; storing the report is left to the caller.
    pub fn attribute(
        &self,
        source: &mut Source,
        trigger: &Trigger,
        existing_reports: &[EventReport],
    ) -> Result<AttributionOutcome, ReportError> {
        use AttributionOutcome::Dropped;

        if source.status() != SourceStatus::Active {
            return Ok(Dropped(DropReason::SourceNotActive));
        }
        if !self.is_source_matching(source, trigger) {
            return Ok(Dropped(DropReason::DestinationMismatch));
        }

        let filter_map = source.filter_map(&self.policy)?;
        if !is_eligible(
            &filter_map,
            trigger.filters(),
            trigger.not_filters(),
            elapsed_seconds(source, trigger),
        ) {
            debug!("Trigger {} filtered out by source {}", trigger.id(), source.id());
            return Ok(Dropped(DropReason::FilterMismatch));
        }

        let Some(event_trigger) = self.select_event_trigger(source, trigger)?
        else {
            return Ok(Dropped(DropReason::NoMatchingEventTrigger));
        };

        if source.attribution_mode() != AttributionMode::Truthfully {
            return Ok(Dropped(DropReason::NoisedSource));
        }

        if let Some(dedup_key) = event_trigger.dedup_key() {
            if source.has_event_report_dedup_key(dedup_key) {
                debug!("Dedup key {} already reported for {}", dedup_key, source.id());
                return Ok(Dropped(DropReason::Deduplicated));
            }
        }

        let report = match build_event_report(
            source,
            trigger,
            event_trigger,
            &self.windows,
            &self.noise,
            &self.policy,
        ) {
            Ok(report) => report,
            Err(ReportError::OutsideReportWindows { .. }) => {
                return Ok(Dropped(DropReason::OutsideReportWindows));
            }
            Err(e) => return Err(e),
        };

        let live: Vec<&EventReport> = existing_reports
            .iter()
            .filter(|r| {
                r.source_id() == source.id()
                    && !r.is_fake()
                    && r.status() != EventReportStatus::MarkedToDelete
            })
            .collect();

        if let Some(spec) = source.report_spec() {
            let cap = u32::try_from(report.trigger_data())
                .ok()
                .and_then(|value| spec.spec_for_trigger_data(value))
                .map(|trigger_spec| trigger_spec.cap() as usize)
                .unwrap_or(0);
            let same_data = live
                .iter()
                .filter(|r| r.trigger_data() == report.trigger_data())
                .count();
            if same_data >= cap {
                return Ok(Dropped(DropReason::TriggerDataCapReached));
            }
        }

        let mut replaced = None;
        let max_reports = source.max_event_level_reports(&self.policy) as usize;
        if live.len() >= max_reports {
            // Lowest priority first, then most recent trigger.
            let lowest = live
                .iter()
                .filter(|r| {
                    r.status() == EventReportStatus::Pending
                        && r.report_time() == report.report_time()
                })
                .min_by(|a, b| {
                    a.trigger_priority()
                        .cmp(&b.trigger_priority())
                        .then_with(|| b.trigger_time().cmp(&a.trigger_time()))
                });
            match lowest {
                Some(lowest)
                    if lowest.trigger_priority() < report.trigger_priority() =>
                {
                    info!(
                        "Report {} replaced by trigger {} of higher priority",
                        lowest.id(),
                        trigger.id()
                    );
                    replaced = Some(lowest.id().to_string());
                }
                _ => return Ok(Dropped(DropReason::ReportCapReached)),
            }
        }

        if let Some(dedup_key) = event_trigger.dedup_key() {
            source.record_event_report_dedup_key(dedup_key);
        }
        Ok(AttributionOutcome::Attributed { report, replaced })
    }

    /// Registers a source in the store, along with its fake reports.
    pub fn store_source<S, R>(
        &self,
        store: &S,
        registration: SourceRegistration,
        rng: &mut R,
    ) -> Result<String>
    where
        S: MeasurementStore,
        R: Rng + ?Sized,
    {
        let registered = self.register_source(registration, rng)?;
        let source_id = registered.source.id().to_string();
        store.run_in_write(|tables| {
            tables.insert_source(registered.source)?;
            for report in registered.fake_reports {
                tables.insert_event_report(report)?;
            }
            Ok(())
        })?;
        Ok(source_id)
    }

    pub fn store_trigger<S: MeasurementStore>(
        &self,
        store: &S,
        registration: TriggerRegistration,
    ) -> Result<String> {
        let trigger = self.register_trigger(registration)?;
        let trigger_id = trigger.id().to_string();
        store.run_in_write(|tables| tables.insert_trigger(trigger))?;
        Ok(trigger_id)
    }

    /// Attributes a stored pending trigger to the highest-priority, then most
    /// recent, matching active source. Competing sources are ignored once the
    /// trigger attributes.
    pub fn process_trigger<S: MeasurementStore>(
        &self,
        store: &S,
        trigger_id: &str,
    ) -> Result<AttributionOutcome> {
        store.run_in_write(|tables| {
            let trigger = tables.trigger(trigger_id)?.clone();
            if trigger.status() != TriggerStatus::Pending {
                anyhow::bail!("Trigger {} was already processed", trigger_id);
            }

            let mut candidates: Vec<(i64, u64, String)> = tables
                .candidate_sources(&trigger)
                .into_iter()
                .filter(|source| source.status() == SourceStatus::Active)
                .map(|source| {
                    (source.priority(), source.event_time(), source.id().to_string())
                })
                .collect();
            candidates.sort();
            let Some((_, _, selected_id)) = candidates.pop() else {
                tables
                    .trigger_mut(trigger_id)?
                    .set_status(TriggerStatus::Ignored)?;
                return Ok(AttributionOutcome::Dropped(
                    DropReason::NoMatchingSource,
                ));
            };

            let existing: Vec<EventReport> = tables
                .event_reports_for_source(&selected_id)
                .into_iter()
                .cloned()
                .collect();
            let outcome = self.attribute(
                tables.source_mut(&selected_id)?,
                &trigger,
                &existing,
            )?;

            match &outcome {
                AttributionOutcome::Attributed { report, replaced } => {
                    if let Some(replaced) = replaced {
                        tables
                            .event_report_mut(replaced)?
                            .set_status(EventReportStatus::MarkedToDelete)?;
                    }
                    tables.insert_event_report(report.clone())?;
                    for (_, _, competing) in &candidates {
                        tables
                            .source_mut(competing)?
                            .set_status(SourceStatus::Ignored)?;
                    }
                    tables
                        .trigger_mut(trigger_id)?
                        .set_status(TriggerStatus::Attributed)?;
                    info!("Trigger {} attributed to {}", trigger_id, selected_id);
                }
                AttributionOutcome::Dropped(reason) => {
                    tables
                        .trigger_mut(trigger_id)?
                        .set_status(TriggerStatus::Ignored)?;
                    debug!("Trigger {} dropped: {:?}", trigger_id, reason);
                }
            }
            Ok(outcome)
        })
    }

    /// Processes every pending trigger, oldest first.
    pub fn process_pending_triggers<S: MeasurementStore>(
        &self,
        store: &S,
    ) -> Result<Vec<AttributionOutcome>> {
        let pending =
            store.run_in_read(|tables| Ok(tables.pending_trigger_ids()))?;
        pending
            .iter()
            .map(|trigger_id| self.process_trigger(store, trigger_id))
            .collect()
    }
}

/// Source age at the trigger, in whole seconds.
fn elapsed_seconds(source: &Source, trigger: &Trigger) -> u64 {
    trigger.trigger_time().saturating_sub(source.event_time()) / 1000
}
