use thiserror::Error;

/// Rejections raised while compiling trigger specs and report specs.
///
/// Each variant is a deterministic validation failure: the registration that
/// carried the spec is dropped and the reason surfaced to the registrant.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("malformed trigger spec: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unrecognized summary operator `{0}`")]
    UnknownSummaryOperator(String),

    #[error("`{field}` must not be empty")]
    Empty { field: &'static str },

    #[error("`{field}` has {len} entries, more than the allowed {max}")]
    TooManyEntries {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("`{field}` must be strictly increasing")]
    NotStrictlyIncreasing { field: &'static str },

    #[error("window end {end_time}s is below the minimum of {min}s")]
    WindowTooShort { end_time: u64, min: u64 },

    #[error("start time {start_time}s is not before the first window end {first_end}s")]
    StartAfterFirstWindow { start_time: u64, first_end: u64 },

    #[error("summary bucket thresholds must be positive")]
    NonPositiveBucket,

    #[error("trigger data {0} appears in more than one trigger spec")]
    DuplicateTriggerData(u32),

    #[error("max event level reports {max_reports} is outside 1..={ceiling}")]
    InvalidMaxReports { max_reports: u32, ceiling: u32 },

    #[error("per-type window and cap lists differ in length ({windows} vs {caps})")]
    MismatchedLengths { windows: usize, caps: usize },

    #[error("trigger data type {index} has no report windows")]
    NoWindows { index: usize },

    #[error("state count does not fit in 128 bits")]
    StateCountOverflow,

    #[error("state rank {rank} is out of range for {num_states} states")]
    RankOutOfRange { rank: u128, num_states: u128 },

    #[error("information gain {information_gain:.4} bits exceeds the allowed {max:.4} bits")]
    InformationGainExceeded { information_gain: f64, max: f64 },
}

/// Rejections raised while parsing declarative filter data.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("malformed filter: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("filter value for `{key}` must be {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("source filter data must not declare reserved key `{0}`")]
    ReservedKey(String),

    #[error("{what} has {len} entries, more than the allowed {max}")]
    TooManyEntries {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("filter string `{0}` is too long")]
    StringTooLong(String),
}

/// Failures of the attribution step itself.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("trigger time {trigger_time} falls outside every report window")]
    OutsideReportWindows { trigger_time: u64 },

    #[error("trigger data cardinality must be positive")]
    ZeroCardinality,
}

/// Rejections of a source or trigger registration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("malformed event triggers: {0}")]
    MalformedEventTriggers(#[from] serde_json::Error),

    #[error("required field `{0}` is empty")]
    MissingField(&'static str),

    #[error("source declares no attribution destination")]
    NoDestination,

    #[error("`{field}` must be a 64-bit unsigned integer or its decimal string")]
    InvalidUnsigned { field: &'static str },

    #[error("`{field}` must be a 64-bit signed integer or its decimal string")]
    InvalidSigned { field: &'static str },

    #[error("expiry {expiry_time} is not after the event time {event_time}")]
    InvalidExpiry { event_time: u64, expiry_time: u64 },

    #[error("event report window {window} is outside ({event_time}, {expiry_time}]")]
    InvalidEventReportWindow {
        event_time: u64,
        window: u64,
        expiry_time: u64,
    },
}

/// Lifecycle transitions that would move a record backwards.
#[derive(Debug, Error)]
#[error("invalid status transition from {from} to {to}")]
pub struct StatusError {
    pub from: &'static str,
    pub to: &'static str,
}
