use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;

use crate::{
    events::{
        source::{Source, SourceStatus},
        trigger::{Trigger, TriggerStatus},
    },
    reports::event_report::EventReport,
    storage::traits::{MeasurementStore, MeasurementTables},
};

/// In-memory tables keyed by record id.
#[derive(Debug, Clone, Default)]
pub struct HashMapTables {
    sources: HashMap<String, Source>,
    triggers: HashMap<String, Trigger>,
    event_reports: Vec<EventReport>,
}

impl HashMapTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn event_reports(&self) -> &[EventReport] {
        &self.event_reports
    }
}

impl MeasurementTables for HashMapTables {
    fn insert_source(&mut self, source: Source) -> Result<()> {
        if self.sources.contains_key(source.id()) {
            bail!("Source {} already exists", source.id());
        }
        self.sources.insert(source.id().to_string(), source);
        Ok(())
    }

    fn insert_trigger(&mut self, trigger: Trigger) -> Result<()> {
        if self.triggers.contains_key(trigger.id()) {
            bail!("Trigger {} already exists", trigger.id());
        }
        self.triggers.insert(trigger.id().to_string(), trigger);
        Ok(())
    }

    fn insert_event_report(&mut self, report: EventReport) -> Result<()> {
        self.event_reports.push(report);
        Ok(())
    }

    fn source(&self, source_id: &str) -> Result<&Source> {
        self.sources.get(source_id).context("Source does not exist")
    }

    fn source_mut(&mut self, source_id: &str) -> Result<&mut Source> {
        self.sources
            .get_mut(source_id)
            .context("Source does not exist")
    }

    fn trigger(&self, trigger_id: &str) -> Result<&Trigger> {
        self.triggers.get(trigger_id).context("Trigger does not exist")
    }

    fn trigger_mut(&mut self, trigger_id: &str) -> Result<&mut Trigger> {
        self.triggers
            .get_mut(trigger_id)
            .context("Trigger does not exist")
    }

    fn candidate_sources(&self, trigger: &Trigger) -> Vec<&Source> {
        self.sources
            .values()
            .filter(|source| {
                source.enrollment_id() == trigger.enrollment_id()
                    && source
                        .destinations(trigger.destination_type())
                        .iter()
                        .any(|d| d == trigger.attribution_destination())
                    && source.event_time() <= trigger.trigger_time()
                    && trigger.trigger_time() < source.expiry_time()
            })
            .collect()
    }

    fn event_reports_for_source(&self, source_id: &str) -> Vec<&EventReport> {
        self.event_reports
            .iter()
            .filter(|report| report.source_id() == source_id)
            .collect()
    }

    fn event_report_mut(&mut self, report_id: &str) -> Result<&mut EventReport> {
        self.event_reports
            .iter_mut()
            .find(|report| report.id() == report_id)
            .context("Event report does not exist")
    }

    fn pending_trigger_ids(&self) -> Vec<String> {
        let mut pending: Vec<&Trigger> = self
            .triggers
            .values()
            .filter(|trigger| trigger.status() == TriggerStatus::Pending)
            .collect();
        pending.sort_by(|a, b| {
            a.trigger_time()
                .cmp(&b.trigger_time())
                .then_with(|| a.id().cmp(b.id()))
        });
        pending.iter().map(|trigger| trigger.id().to_string()).collect()
    }

    fn mark_expired_sources(&mut self, now: u64) -> Result<usize> {
        let mut marked = 0;
        for source in self.sources.values_mut() {
            if source.expiry_time() <= now
                && source.status() != SourceStatus::MarkedToDelete
            {
                source.set_status(SourceStatus::MarkedToDelete)?;
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// [`MeasurementStore`] over [`HashMapTables`] behind a reader/writer lock.
///
/// Write transactions run on a copy of the tables that replaces the live one
/// only on success. Each write clones every table, so processing all pending
/// triggers costs O(triggers x records); fine for an in-memory store, not for
/// large volumes.
#[derive(Debug, Default)]
pub struct HashMapMeasurementStore {
    tables: RwLock<HashMapTables>,
}

impl HashMapMeasurementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementStore for HashMapMeasurementStore {
    type Tables = HashMapTables;

    fn run_in_read<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&HashMapTables) -> Result<T>,
    {
        let tables = self.tables.read();
        operation(&tables)
    }

    fn run_in_write<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut HashMapTables) -> Result<T>,
    {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        let result = operation(&mut staged)?;
        *tables = staged;
        Ok(result)
    }
}
