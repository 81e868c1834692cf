use anyhow::Result;

use crate::{
    events::{source::Source, trigger::Trigger},
    reports::event_report::EventReport,
};

/// Records persisted by the measurement layer.
pub trait MeasurementTables {
    /// Stores a new source. Fails if the id is already taken.
    fn insert_source(&mut self, source: Source) -> Result<()>;

    /// Stores a new trigger. Fails if the id is already taken.
    fn insert_trigger(&mut self, trigger: Trigger) -> Result<()>;

    fn insert_event_report(&mut self, report: EventReport) -> Result<()>;

    fn source(&self, source_id: &str) -> Result<&Source>;

    fn source_mut(&mut self, source_id: &str) -> Result<&mut Source>;

    fn trigger(&self, trigger_id: &str) -> Result<&Trigger>;

    fn trigger_mut(&mut self, trigger_id: &str) -> Result<&mut Trigger>;

    /// Sources a trigger may attribute to: same enrollment, declaring the
    /// trigger's destination, and live at the trigger time. Status is not
    /// checked here.
    fn candidate_sources(&self, trigger: &Trigger) -> Vec<&Source>;

    /// Event reports of a source, fake ones included.
    fn event_reports_for_source(&self, source_id: &str) -> Vec<&EventReport>;

    fn event_report_mut(&mut self, report_id: &str) -> Result<&mut EventReport>;

    /// Ids of triggers still waiting for attribution, oldest first.
    fn pending_trigger_ids(&self) -> Vec<String>;

    /// Marks sources expired at `now` for deletion. Returns how many changed.
    fn mark_expired_sources(&mut self, now: u64) -> Result<usize>;
}

/// Transaction wrapper over [`MeasurementTables`].
///
/// Read transactions may run concurrently. Write transactions are exclusive,
/// and their changes are only kept if the operation succeeds.
pub trait MeasurementStore {
    type Tables: MeasurementTables;

    fn run_in_read<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&Self::Tables) -> Result<T>;

    fn run_in_write<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Self::Tables) -> Result<T>;
}
