use rand::Rng;

use crate::{
    errors::SpecError,
    events::source::{DestinationType, Source},
    reports::event_report::EventReport,
};

/// A report window, as absolute millisecond timestamps `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: u64,
    pub end: u64,
}

/// Computes when event reports of a source are delivered.
pub trait ReportWindowCalculator {
    /// Windows that apply to reports of `trigger_data` (already truncated)
    /// towards a destination of the given type, in increasing order.
    fn report_windows(
        &self,
        source: &Source,
        trigger_data: u64,
        destination_type: DestinationType,
    ) -> Vec<ReportWindow>;

    /// Delivery time of reports produced in `window`.
    fn report_time(&self, source: &Source, window: &ReportWindow) -> u64;

    /// Delivery time of a report for a trigger at `trigger_time`: the end of
    /// the window containing the trigger, plus the delivery delay. `None` if
    /// no window contains the trigger.
    fn reporting_time(
        &self,
        source: &Source,
        trigger_time: u64,
        trigger_data: u64,
        destination_type: DestinationType,
    ) -> Option<u64> {
        self.report_windows(source, trigger_data, destination_type)
            .iter()
            .find(|window| window.start <= trigger_time && trigger_time < window.end)
            .map(|window| self.report_time(source, window))
    }
}

/// Applies randomized response to sources.
pub trait NoiseHandler {
    /// Probability in `[0, 1]` that the source's reports were randomized.
    fn randomized_trigger_rate(&self, source: &Source) -> f64;

    /// Runs randomized response for a newly registered source. Returns `None`
    /// if the source reports truthfully, or the fake reports standing in for
    /// the real ones otherwise (possibly none).
    fn fake_reports<W, R>(
        &self,
        source: &Source,
        windows: &W,
        rng: &mut R,
    ) -> Result<Option<Vec<EventReport>>, SpecError>
    where
        W: ReportWindowCalculator + ?Sized,
        R: Rng + ?Sized;
}
