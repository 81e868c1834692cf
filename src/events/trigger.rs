use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::policy::PrivacyPolicy,
    errors::{RegistrationError, StatusError},
    events::source::DestinationType,
    filtering::filter_map::{parse_filter_set, parse_filter_set_str, FilterMap},
};

/// Lifecycle of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStatus {
    Pending,
    Ignored,
    Attributed,
    MarkedToDelete,
}

impl TriggerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ignored => "IGNORED",
            Self::Attributed => "ATTRIBUTED",
            Self::MarkedToDelete => "MARKED_TO_DELETE",
        }
    }

    fn can_transition_to(&self, next: TriggerStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Ignored)
                | (Self::Pending, Self::Attributed)
                | (Self::Pending, Self::MarkedToDelete)
                | (Self::Ignored, Self::MarkedToDelete)
                | (Self::Attributed, Self::MarkedToDelete)
        )
    }
}

/// One entry of a trigger's `event_trigger_data` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTrigger {
    trigger_data: u64,
    priority: i64,
    dedup_key: Option<u64>,
    filter_set: Option<Vec<FilterMap>>,
    not_filter_set: Option<Vec<FilterMap>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventTriggerJson {
    #[serde(default)]
    trigger_data: Option<Value>,
    #[serde(default)]
    priority: Option<Value>,
    #[serde(default)]
    deduplication_key: Option<Value>,
    #[serde(default)]
    filters: Option<Value>,
    #[serde(default)]
    not_filters: Option<Value>,
}

impl EventTrigger {
    pub fn new(
        trigger_data: u64,
        priority: i64,
        dedup_key: Option<u64>,
        filter_set: Option<Vec<FilterMap>>,
        not_filter_set: Option<Vec<FilterMap>>,
    ) -> Self {
        Self {
            trigger_data,
            priority,
            dedup_key,
            filter_set,
            not_filter_set,
        }
    }

    /// Parses the declarative event trigger array. 64-bit fields may be given
    /// as numbers or decimal strings; unknown fields are rejected.
    pub fn parse_list(
        json: &str,
        policy: &PrivacyPolicy,
    ) -> Result<Vec<Self>, RegistrationError> {
        let entries: Vec<EventTriggerJson> = serde_json::from_str(json)?;
        entries
            .into_iter()
            .map(|entry| -> Result<Self, RegistrationError> {
                let trigger_data = entry
                    .trigger_data
                    .as_ref()
                    .map(|v| parse_unsigned(v, "trigger_data"))
                    .transpose()?
                    .unwrap_or(0);
                let priority = entry
                    .priority
                    .as_ref()
                    .map(|v| parse_signed(v, "priority"))
                    .transpose()?
                    .unwrap_or(0);
                let dedup_key = entry
                    .deduplication_key
                    .as_ref()
                    .map(|v| parse_unsigned(v, "deduplication_key"))
                    .transpose()?;
                let filter_set = entry
                    .filters
                    .as_ref()
                    .map(|v| parse_filter_set(v, policy))
                    .transpose()?;
                let not_filter_set = entry
                    .not_filters
                    .as_ref()
                    .map(|v| parse_filter_set(v, policy))
                    .transpose()?;
                Ok(Self::new(
                    trigger_data,
                    priority,
                    dedup_key,
                    filter_set,
                    not_filter_set,
                ))
            })
            .collect()
    }

    pub fn trigger_data(&self) -> u64 {
        self.trigger_data
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn dedup_key(&self) -> Option<u64> {
        self.dedup_key
    }

    pub fn filter_set(&self) -> Option<&[FilterMap]> {
        self.filter_set.as_deref()
    }

    pub fn not_filter_set(&self) -> Option<&[FilterMap]> {
        self.not_filter_set.as_deref()
    }
}

/// Registration request for a trigger. Timestamps are milliseconds.
#[derive(Debug, Clone)]
pub struct TriggerRegistration {
    pub id: String,
    pub attribution_destination: String,
    pub destination_type: DestinationType,
    pub enrollment_id: String,
    pub registrant: String,
    pub trigger_time: u64,

    /// Declarative `event_trigger_data` array.
    pub event_triggers: String,

    pub aggregate_trigger_data: Option<String>,
    pub aggregate_values: Option<String>,
    pub aggregate_deduplication_keys: Option<String>,
    pub filters: Option<String>,
    pub not_filters: Option<String>,
    pub debug_key: Option<u64>,
    pub debug_reporting: bool,
}

/// A registered conversion event.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    id: String,
    attribution_destination: String,
    destination_type: DestinationType,
    enrollment_id: String,
    registrant: String,
    trigger_time: u64,
    event_triggers: Vec<EventTrigger>,
    aggregate_trigger_data: Option<String>,
    aggregate_values: Option<String>,
    aggregate_deduplication_keys: Option<String>,
    filters: Option<Vec<FilterMap>>,
    not_filters: Option<Vec<FilterMap>>,
    debug_key: Option<u64>,
    debug_reporting: bool,
    status: TriggerStatus,
}

impl Trigger {
    pub fn register(
        registration: TriggerRegistration,
        policy: &PrivacyPolicy,
    ) -> Result<Self, RegistrationError> {
        for (field, value) in [
            ("id", &registration.id),
            ("attribution_destination", &registration.attribution_destination),
            ("enrollment_id", &registration.enrollment_id),
            ("registrant", &registration.registrant),
        ] {
            if value.is_empty() {
                return Err(RegistrationError::MissingField(field));
            }
        }

        let event_triggers =
            EventTrigger::parse_list(&registration.event_triggers, policy)?;
        let filters = registration
            .filters
            .as_deref()
            .map(|json| parse_filter_set_str(json, policy))
            .transpose()?;
        let not_filters = registration
            .not_filters
            .as_deref()
            .map(|json| parse_filter_set_str(json, policy))
            .transpose()?;

        Ok(Self {
            id: registration.id,
            attribution_destination: registration.attribution_destination,
            destination_type: registration.destination_type,
            enrollment_id: registration.enrollment_id,
            registrant: registration.registrant,
            trigger_time: registration.trigger_time,
            event_triggers,
            aggregate_trigger_data: registration.aggregate_trigger_data,
            aggregate_values: registration.aggregate_values,
            aggregate_deduplication_keys: registration
                .aggregate_deduplication_keys,
            filters,
            not_filters,
            debug_key: registration.debug_key,
            debug_reporting: registration.debug_reporting,
            status: TriggerStatus::Pending,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attribution_destination(&self) -> &str {
        &self.attribution_destination
    }

    pub fn destination_type(&self) -> DestinationType {
        self.destination_type
    }

    pub fn enrollment_id(&self) -> &str {
        &self.enrollment_id
    }

    pub fn registrant(&self) -> &str {
        &self.registrant
    }

    pub fn trigger_time(&self) -> u64 {
        self.trigger_time
    }

    pub fn event_triggers(&self) -> &[EventTrigger] {
        &self.event_triggers
    }

    pub fn aggregate_trigger_data(&self) -> Option<&str> {
        self.aggregate_trigger_data.as_deref()
    }

    pub fn aggregate_values(&self) -> Option<&str> {
        self.aggregate_values.as_deref()
    }

    pub fn aggregate_deduplication_keys(&self) -> Option<&str> {
        self.aggregate_deduplication_keys.as_deref()
    }

    pub fn filters(&self) -> Option<&[FilterMap]> {
        self.filters.as_deref()
    }

    pub fn not_filters(&self) -> Option<&[FilterMap]> {
        self.not_filters.as_deref()
    }

    pub fn debug_key(&self) -> Option<u64> {
        self.debug_key
    }

    pub fn is_debug_reporting(&self) -> bool {
        self.debug_reporting
    }

    pub fn status(&self) -> TriggerStatus {
        self.status
    }

    pub fn set_status(&mut self, next: TriggerStatus) -> Result<(), StatusError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusError {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}

fn parse_unsigned(
    value: &Value,
    field: &'static str,
) -> Result<u64, RegistrationError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or(RegistrationError::InvalidUnsigned { field })
}

fn parse_signed(
    value: &Value,
    field: &'static str,
) -> Result<i64, RegistrationError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or(RegistrationError::InvalidSigned { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_triggers() {
        let policy = PrivacyPolicy::default();
        let triggers = EventTrigger::parse_list(
            r#"[
                {"trigger_data": "9", "priority": "-5", "deduplication_key": "18446744073709551615",
                 "filters": {"type": ["a"]}, "not_filters": [{"type": ["b"]}]},
                {"trigger_data": 2}
            ]"#,
            &policy,
        )
        .unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].trigger_data(), 9);
        assert_eq!(triggers[0].priority(), -5);
        assert_eq!(triggers[0].dedup_key(), Some(u64::MAX));
        assert_eq!(triggers[0].filter_set().unwrap().len(), 1);
        assert_eq!(triggers[0].not_filter_set().unwrap().len(), 1);
        assert_eq!(triggers[1].priority(), 0);
        assert!(triggers[1].filter_set().is_none());
    }

    #[test]
    fn test_malformed_event_triggers() {
        let policy = PrivacyPolicy::default();
        assert!(matches!(
            EventTrigger::parse_list(r#"[{"trigger_data": "x"}]"#, &policy),
            Err(RegistrationError::InvalidUnsigned {
                field: "trigger_data"
            })
        ));
        assert!(matches!(
            EventTrigger::parse_list(r#"[{"trigger_data": -1}]"#, &policy),
            Err(RegistrationError::InvalidUnsigned { .. })
        ));
        assert!(matches!(
            EventTrigger::parse_list(r#"[{"trigger_datum": 1}]"#, &policy),
            Err(RegistrationError::MalformedEventTriggers(_))
        ));
        assert!(matches!(
            EventTrigger::parse_list(r#"{"trigger_data": 1}"#, &policy),
            Err(RegistrationError::MalformedEventTriggers(_))
        ));
    }

    #[test]
    fn test_register_trigger() {
        let policy = PrivacyPolicy::default();
        let registration = TriggerRegistration {
            filters: Some(r#"{"product": ["1234"]}"#.to_string()),
            ..TriggerRegistration::mock()
        };
        let trigger = Trigger::register(registration, &policy).unwrap();
        assert_eq!(trigger.status(), TriggerStatus::Pending);
        assert_eq!(trigger.filters().unwrap().len(), 1);
        assert!(trigger.not_filters().is_none());

        let registration = TriggerRegistration {
            not_filters: Some("[1]".to_string()),
            ..TriggerRegistration::mock()
        };
        assert!(matches!(
            Trigger::register(registration, &policy),
            Err(RegistrationError::Filter(_))
        ));
    }

    #[test]
    fn test_status_machine() {
        let policy = PrivacyPolicy::default();
        let mut trigger =
            Trigger::register(TriggerRegistration::mock(), &policy).unwrap();
        trigger.set_status(TriggerStatus::Attributed).unwrap();
        assert!(trigger.set_status(TriggerStatus::Ignored).is_err());
        assert!(trigger.set_status(TriggerStatus::Pending).is_err());
        trigger.set_status(TriggerStatus::MarkedToDelete).unwrap();
    }
}
