use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::{config::policy::PrivacyPolicy, errors::SpecError};

/// How triggers accumulate towards summary buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SummaryOperator {
    /// Each attributed trigger counts as one.
    #[default]
    Count,

    /// Each attributed trigger contributes its value.
    ValueSum,
}

impl SummaryOperator {
    /// Parses the declarative token, ignoring case. Unknown tokens are an
    /// error, never a silent default.
    pub fn parse(token: &str) -> Result<Self, SpecError> {
        match token.to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "value_sum" => Ok(Self::ValueSum),
            _ => Err(SpecError::UnknownSummaryOperator(token.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::ValueSum => "value_sum",
        }
    }
}

/// Report windows of one trigger data type, as offsets in seconds from the
/// source event time. Window `i` spans `[end_times[i - 1], end_times[i])`,
/// the first one starting at `start_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReportWindows {
    start_time: u64,
    end_times: Vec<u64>,
}

impl EventReportWindows {
    pub fn new(
        start_time: u64,
        end_times: Vec<u64>,
        policy: &PrivacyPolicy,
    ) -> Result<Self, SpecError> {
        let first_end = *end_times
            .first()
            .ok_or(SpecError::Empty { field: "end_times" })?;
        let max = policy.max_report_windows as usize;
        if end_times.len() > max {
            return Err(SpecError::TooManyEntries {
                field: "end_times",
                len: end_times.len(),
                max,
            });
        }
        if !is_strictly_increasing(&end_times) {
            return Err(SpecError::NotStrictlyIncreasing { field: "end_times" });
        }
        if first_end < policy.min_report_window_seconds {
            return Err(SpecError::WindowTooShort {
                end_time: first_end,
                min: policy.min_report_window_seconds,
            });
        }
        if start_time >= first_end {
            return Err(SpecError::StartAfterFirstWindow {
                start_time,
                first_end,
            });
        }
        Ok(Self {
            start_time,
            end_times,
        })
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn end_times(&self) -> &[u64] {
        &self.end_times
    }

    pub fn num_windows(&self) -> u32 {
        self.end_times.len() as u32
    }
}

/// Reporting configuration of one trigger data type.
///
/// Only constructible through validating factories, so every instance
/// satisfies the ordering and size invariants.
///
/// The summary operator and bucket thresholds are carried for the declarative
/// round trip, but attribution only uses the number of buckets: it caps the
/// reports per trigger data value and sizes the state space. Every attributed
/// trigger below that cap produces one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    trigger_data: Vec<u32>,
    event_report_windows: EventReportWindows,
    summary_operator: SummaryOperator,
    summary_buckets: Vec<u32>,
}

/// Declarative form. Unknown fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TriggerSpecJson {
    trigger_data: Vec<u32>,
    event_report_windows: EventReportWindowsJson,
    #[serde(default)]
    summary_window_operator: Option<String>,
    #[serde(default)]
    summary_buckets: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventReportWindowsJson {
    #[serde(default)]
    start_time: i64,
    end_times: Vec<u64>,
}

impl TriggerSpec {
    pub fn new(
        trigger_data: Vec<u32>,
        event_report_windows: EventReportWindows,
        summary_operator: SummaryOperator,
        summary_buckets: Vec<u32>,
        policy: &PrivacyPolicy,
    ) -> Result<Self, SpecError> {
        if trigger_data.is_empty() {
            return Err(SpecError::Empty {
                field: "trigger_data",
            });
        }
        let max_cardinality = policy.max_trigger_data_cardinality as usize;
        if trigger_data.len() > max_cardinality {
            return Err(SpecError::TooManyEntries {
                field: "trigger_data",
                len: trigger_data.len(),
                max: max_cardinality,
            });
        }
        let mut seen = HashSet::new();
        for value in &trigger_data {
            if !seen.insert(*value) {
                return Err(SpecError::DuplicateTriggerData(*value));
            }
        }

        if summary_buckets.is_empty() {
            return Err(SpecError::Empty {
                field: "summary_buckets",
            });
        }
        let max_buckets = policy.max_flexible_event_reports as usize;
        if summary_buckets.len() > max_buckets {
            return Err(SpecError::TooManyEntries {
                field: "summary_buckets",
                len: summary_buckets.len(),
                max: max_buckets,
            });
        }
        if !is_strictly_increasing(&summary_buckets) {
            return Err(SpecError::NotStrictlyIncreasing {
                field: "summary_buckets",
            });
        }
        if summary_buckets[0] == 0 {
            return Err(SpecError::NonPositiveBucket);
        }

        Ok(Self {
            trigger_data,
            event_report_windows,
            summary_operator,
            summary_buckets,
        })
    }

    /// Compiles one declarative trigger spec object. `max_event_level_reports`
    /// provides the default summary buckets `[1, 2, ..., max]`.
    pub fn from_value(
        value: &Value,
        max_event_level_reports: u32,
        policy: &PrivacyPolicy,
    ) -> Result<Self, SpecError> {
        let json = TriggerSpecJson::deserialize(value)?;

        let summary_operator = match &json.summary_window_operator {
            Some(token) => SummaryOperator::parse(token)?,
            None => SummaryOperator::default(),
        };
        let summary_buckets = json
            .summary_buckets
            .unwrap_or_else(|| (1..=max_event_level_reports).collect());
        let windows = EventReportWindows::new(
            json.event_report_windows.start_time.max(0) as u64,
            json.event_report_windows.end_times,
            policy,
        )?;

        Self::new(
            json.trigger_data,
            windows,
            summary_operator,
            summary_buckets,
            policy,
        )
    }

    pub fn from_json(
        json: &str,
        max_event_level_reports: u32,
        policy: &PrivacyPolicy,
    ) -> Result<Self, SpecError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value, max_event_level_reports, policy)
    }

    /// Declarative form, with every optional field spelled out.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "trigger_data": self.trigger_data,
            "event_report_windows": {
                "start_time": self.event_report_windows.start_time,
                "end_times": self.event_report_windows.end_times,
            },
            "summary_window_operator": self.summary_operator.as_str(),
            "summary_buckets": self.summary_buckets,
        })
    }

    pub fn trigger_data(&self) -> &[u32] {
        &self.trigger_data
    }

    pub fn event_report_windows(&self) -> &EventReportWindows {
        &self.event_report_windows
    }

    pub fn summary_operator(&self) -> SummaryOperator {
        self.summary_operator
    }

    pub fn summary_buckets(&self) -> &[u32] {
        &self.summary_buckets
    }

    pub fn num_windows(&self) -> u32 {
        self.event_report_windows.num_windows()
    }

    /// Number of reports one trigger data value of this spec can produce.
    pub fn cap(&self) -> u32 {
        self.summary_buckets.len() as u32
    }
}

pub(crate) fn is_strictly_increasing<T: Ord>(values: &[T]) -> bool {
    values.windows(2).all(|pair| pair[0] < pair[1])
}
