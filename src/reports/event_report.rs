use serde::Serialize;
use uuid::Uuid;

use crate::{
    errors::StatusError,
    events::source::{DestinationType, Source, SourceType},
};

/// Delivery status of an event report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventReportStatus {
    Pending,
    Delivered,
    MarkedToDelete,
}

impl EventReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::MarkedToDelete => "MARKED_TO_DELETE",
        }
    }
}

/// Whether a debug copy of the report will be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebugReportStatus {
    None,
    Pending,
}

/// Source and trigger debug keys, present only for the sides that opted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugKeyPair {
    pub source: Option<u64>,
    pub trigger: Option<u64>,
}

/// An event-level attribution report.
///
/// Immutable once built, apart from its delivery status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventReport {
    id: String,
    source_id: String,

    /// `None` for fake reports.
    trigger_id: Option<String>,

    source_event_id: u64,
    enrollment_id: String,
    registration_origin: String,
    attribution_destinations: Vec<String>,
    destination_type: DestinationType,
    source_type: SourceType,
    trigger_data: u64,
    trigger_priority: i64,
    trigger_dedup_key: Option<u64>,
    trigger_time: u64,
    report_time: u64,
    randomized_trigger_rate: f64,
    status: EventReportStatus,
    debug_report_status: DebugReportStatus,
    source_debug_key: Option<u64>,
    trigger_debug_key: Option<u64>,
}

/// Fields of a report that do not come from its source.
#[derive(Debug, Clone)]
pub(crate) struct ReportFields {
    pub trigger_id: Option<String>,
    pub attribution_destinations: Vec<String>,
    pub destination_type: DestinationType,
    pub trigger_data: u64,
    pub trigger_priority: i64,
    pub trigger_dedup_key: Option<u64>,
    pub trigger_time: u64,
    pub report_time: u64,
    pub randomized_trigger_rate: f64,
    pub debug_report_status: DebugReportStatus,
    pub debug_keys: DebugKeyPair,
}

impl EventReport {
    pub(crate) fn new(source: &Source, fields: ReportFields) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source.id().to_string(),
            trigger_id: fields.trigger_id,
            source_event_id: source.event_id(),
            enrollment_id: source.enrollment_id().to_string(),
            registration_origin: source.registration_origin().to_string(),
            attribution_destinations: fields.attribution_destinations,
            destination_type: fields.destination_type,
            source_type: source.source_type(),
            trigger_data: fields.trigger_data,
            trigger_priority: fields.trigger_priority,
            trigger_dedup_key: fields.trigger_dedup_key,
            trigger_time: fields.trigger_time,
            report_time: fields.report_time,
            randomized_trigger_rate: fields.randomized_trigger_rate,
            status: EventReportStatus::Pending,
            debug_report_status: fields.debug_report_status,
            source_debug_key: fields.debug_keys.source,
            trigger_debug_key: fields.debug_keys.trigger,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn trigger_id(&self) -> Option<&str> {
        self.trigger_id.as_deref()
    }

    pub fn is_fake(&self) -> bool {
        self.trigger_id.is_none()
    }

    pub fn source_event_id(&self) -> u64 {
        self.source_event_id
    }

    pub fn enrollment_id(&self) -> &str {
        &self.enrollment_id
    }

    pub fn registration_origin(&self) -> &str {
        &self.registration_origin
    }

    pub fn attribution_destinations(&self) -> &[String] {
        &self.attribution_destinations
    }

    pub fn destination_type(&self) -> DestinationType {
        self.destination_type
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn trigger_data(&self) -> u64 {
        self.trigger_data
    }

    pub fn trigger_priority(&self) -> i64 {
        self.trigger_priority
    }

    pub fn trigger_dedup_key(&self) -> Option<u64> {
        self.trigger_dedup_key
    }

    pub fn trigger_time(&self) -> u64 {
        self.trigger_time
    }

    pub fn report_time(&self) -> u64 {
        self.report_time
    }

    pub fn randomized_trigger_rate(&self) -> f64 {
        self.randomized_trigger_rate
    }

    pub fn status(&self) -> EventReportStatus {
        self.status
    }

    pub fn debug_report_status(&self) -> DebugReportStatus {
        self.debug_report_status
    }

    pub fn source_debug_key(&self) -> Option<u64> {
        self.source_debug_key
    }

    pub fn trigger_debug_key(&self) -> Option<u64> {
        self.trigger_debug_key
    }

    /// Only pending reports change status, and never back to pending.
    pub fn set_status(
        &mut self,
        next: EventReportStatus,
    ) -> Result<(), StatusError> {
        if self.status != EventReportStatus::Pending
            || next == EventReportStatus::Pending
        {
            return Err(StatusError {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}
