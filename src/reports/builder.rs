use crate::{
    config::policy::PrivacyPolicy,
    errors::ReportError,
    events::{
        source::Source,
        trigger::{EventTrigger, Trigger},
    },
    reports::{
        event_report::{DebugKeyPair, DebugReportStatus, EventReport, ReportFields},
        traits::{NoiseHandler, ReportWindowCalculator},
    },
};

/// Maps a raw trigger data value into the source's trigger data domain.
///
/// Non-flexible sources reduce it modulo their cardinality. Flexible sources
/// keep values they declare, and map others to the declared value at index
/// `raw % cardinality`. Either way the result is a fixed point.
pub fn truncate_trigger_data(
    raw: u64,
    source: &Source,
    policy: &PrivacyPolicy,
) -> Result<u64, ReportError> {
    let cardinality = u64::from(source.trigger_data_cardinality(policy));
    if cardinality == 0 {
        return Err(ReportError::ZeroCardinality);
    }

    match source.report_spec() {
        None => Ok(raw % cardinality),
        Some(spec) => {
            let declared = u32::try_from(raw)
                .is_ok_and(|value| spec.contains_trigger_data(value));
            if declared {
                return Ok(raw);
            }
            spec.trigger_data_value((raw % cardinality) as usize)
                .map(u64::from)
                .ok_or(ReportError::ZeroCardinality)
        }
    }
}

/// Debug report status and keys. The report is debug-eligible only when both
/// sides opted in and both supplied a key; a key is carried only for a side
/// that opted in.
fn debug_report(source: &Source, trigger: &Trigger) -> (DebugReportStatus, DebugKeyPair) {
    let keys = DebugKeyPair {
        source: source.debug_key().filter(|_| source.is_debug_reporting()),
        trigger: trigger.debug_key().filter(|_| trigger.is_debug_reporting()),
    };
    let status = match keys {
        DebugKeyPair {
            source: Some(_),
            trigger: Some(_),
        } => DebugReportStatus::Pending,
        _ => DebugReportStatus::None,
    };
    (status, keys)
}

/// Builds the event report for a matched (source, trigger, event trigger).
///
/// Fails if the trigger falls outside every report window of the source.
pub fn build_event_report<W, N>(
    source: &Source,
    trigger: &Trigger,
    event_trigger: &EventTrigger,
    windows: &W,
    noise: &N,
    policy: &PrivacyPolicy,
) -> Result<EventReport, ReportError>
where
    W: ReportWindowCalculator + ?Sized,
    N: NoiseHandler + ?Sized,
{
    let trigger_data =
        truncate_trigger_data(event_trigger.trigger_data(), source, policy)?;
    let destination_type = trigger.destination_type();
    let report_time = windows
        .reporting_time(
            source,
            trigger.trigger_time(),
            trigger_data,
            destination_type,
        )
        .ok_or(ReportError::OutsideReportWindows {
            trigger_time: trigger.trigger_time(),
        })?;
    let (debug_report_status, debug_keys) = debug_report(source, trigger);

    Ok(EventReport::new(
        source,
        ReportFields {
            trigger_id: Some(trigger.id().to_string()),
            attribution_destinations: source
                .destinations(destination_type)
                .to_vec(),
            destination_type,
            trigger_data,
            trigger_priority: event_trigger.priority(),
            trigger_dedup_key: event_trigger.dedup_key(),
            trigger_time: trigger.trigger_time(),
            report_time,
            randomized_trigger_rate: noise.randomized_trigger_rate(source),
            debug_report_status,
            debug_keys,
        },
    ))
}
