use log::debug;
use serde::Serialize;

use crate::{
    config::policy::PrivacyPolicy,
    errors::{FilterError, RegistrationError, StatusError},
    filtering::filter_map::FilterMap,
    specs::report_spec::ReportSpec,
};

/// Kind of ad interaction a source records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Impression.
    Event,

    /// Click.
    Navigation,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Navigation => "navigation",
        }
    }
}

/// Kind of attribution destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationType {
    App,
    Web,
}

/// Lifecycle of a source. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    Active,
    Ignored,
    MarkedToDelete,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Ignored => "IGNORED",
            Self::MarkedToDelete => "MARKED_TO_DELETE",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Ignored => 1,
            Self::MarkedToDelete => 2,
        }
    }
}

/// Outcome of the randomized response run when the source was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMode {
    /// Real triggers attribute normally.
    Truthfully,

    /// Noise chose the empty state: the source never attributes.
    Never,

    /// Noise chose fake reports: real triggers never attribute.
    Falsely,
}

/// Registration request for a source, as received from the ad tech.
/// Timestamps are milliseconds since the epoch.
#[derive(Debug, Clone)]
pub struct SourceRegistration {
    pub id: String,
    pub event_id: u64,
    pub publisher: String,
    pub app_destinations: Vec<String>,
    pub web_destinations: Vec<String>,
    pub enrollment_id: String,
    pub registrant: String,
    pub registration_origin: String,
    pub source_type: SourceType,
    pub priority: i64,
    pub event_time: u64,
    pub expiry_time: u64,

    /// End of event-level attribution. Defaults to `expiry_time`.
    pub event_report_window: Option<u64>,

    pub filter_data: Option<String>,
    pub aggregate_source: Option<String>,
    pub install_attributed: bool,
    pub debug_key: Option<u64>,
    pub debug_reporting: bool,

    /// Declarative `trigger_specs` array, making the source flexible.
    pub trigger_specs: Option<String>,

    /// Report ceiling of a flexible source. Defaults to the source type's.
    pub max_event_level_reports: Option<u32>,
}

/// A registered ad-exposure event.
///
/// Built only through [`Source::register`], which validates every
/// declarative field and compiles the flexible report spec, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    id: String,
    event_id: u64,
    publisher: String,
    app_destinations: Vec<String>,
    web_destinations: Vec<String>,
    enrollment_id: String,
    registrant: String,
    registration_origin: String,
    source_type: SourceType,
    priority: i64,
    event_time: u64,
    expiry_time: u64,
    event_report_window: u64,
    filter_data: Option<String>,
    aggregate_source: Option<String>,
    install_attributed: bool,
    debug_key: Option<u64>,
    debug_reporting: bool,
    report_spec: Option<ReportSpec>,
    status: SourceStatus,
    attribution_mode: AttributionMode,
    event_report_dedup_keys: Vec<u64>,
    aggregate_contributions: u32,
}

impl Source {
    pub fn register(
        registration: SourceRegistration,
        policy: &PrivacyPolicy,
    ) -> Result<Self, RegistrationError> {
        for (field, value) in [
            ("id", &registration.id),
            ("publisher", &registration.publisher),
            ("enrollment_id", &registration.enrollment_id),
            ("registrant", &registration.registrant),
            ("registration_origin", &registration.registration_origin),
        ] {
            if value.is_empty() {
                return Err(RegistrationError::MissingField(field));
            }
        }
        if registration.app_destinations.is_empty()
            && registration.web_destinations.is_empty()
        {
            return Err(RegistrationError::NoDestination);
        }
        if registration.expiry_time <= registration.event_time {
            return Err(RegistrationError::InvalidExpiry {
                event_time: registration.event_time,
                expiry_time: registration.expiry_time,
            });
        }
        let event_report_window = registration
            .event_report_window
            .unwrap_or(registration.expiry_time);
        if event_report_window <= registration.event_time
            || event_report_window > registration.expiry_time
        {
            return Err(RegistrationError::InvalidEventReportWindow {
                event_time: registration.event_time,
                window: event_report_window,
                expiry_time: registration.expiry_time,
            });
        }

        if let Some(filter_data) = &registration.filter_data {
            FilterMap::parse_source_filter_data(filter_data, policy)?;
        }

        // Compiled, bounded and cached before the source exists.
        let report_spec = match &registration.trigger_specs {
            Some(trigger_specs) => {
                let max_reports =
                    registration.max_event_level_reports.unwrap_or_else(|| {
                        policy.default_max_reports(registration.source_type)
                    });
                Some(ReportSpec::from_json(
                    trigger_specs,
                    max_reports,
                    registration.source_type,
                    policy,
                )?)
            }
            None => None,
        };

        debug!(
            "Registered {} source {} (flexible: {})",
            registration.source_type.as_str(),
            registration.id,
            report_spec.is_some()
        );

        Ok(Self {
            id: registration.id,
            event_id: registration.event_id,
            publisher: registration.publisher,
            app_destinations: registration.app_destinations,
            web_destinations: registration.web_destinations,
            enrollment_id: registration.enrollment_id,
            registrant: registration.registrant,
            registration_origin: registration.registration_origin,
            source_type: registration.source_type,
            priority: registration.priority,
            event_time: registration.event_time,
            expiry_time: registration.expiry_time,
            event_report_window,
            filter_data: registration.filter_data,
            aggregate_source: registration.aggregate_source,
            install_attributed: registration.install_attributed,
            debug_key: registration.debug_key,
            debug_reporting: registration.debug_reporting,
            report_spec,
            status: SourceStatus::Active,
            attribution_mode: AttributionMode::Truthfully,
            event_report_dedup_keys: vec![],
            aggregate_contributions: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn app_destinations(&self) -> &[String] {
        &self.app_destinations
    }

    pub fn web_destinations(&self) -> &[String] {
        &self.web_destinations
    }

    pub fn destinations(&self, destination_type: DestinationType) -> &[String] {
        match destination_type {
            DestinationType::App => &self.app_destinations,
            DestinationType::Web => &self.web_destinations,
        }
    }

    /// App if the source declares an app destination, web otherwise.
    pub fn primary_destination_type(&self) -> DestinationType {
        if self.app_destinations.is_empty() {
            DestinationType::Web
        } else {
            DestinationType::App
        }
    }

    pub fn enrollment_id(&self) -> &str {
        &self.enrollment_id
    }

    pub fn registrant(&self) -> &str {
        &self.registrant
    }

    pub fn registration_origin(&self) -> &str {
        &self.registration_origin
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn event_time(&self) -> u64 {
        self.event_time
    }

    pub fn expiry_time(&self) -> u64 {
        self.expiry_time
    }

    pub fn event_report_window(&self) -> u64 {
        self.event_report_window
    }

    pub fn filter_data(&self) -> Option<&str> {
        self.filter_data.as_deref()
    }

    pub fn aggregate_source(&self) -> Option<&str> {
        self.aggregate_source.as_deref()
    }

    pub fn is_install_attributed(&self) -> bool {
        self.install_attributed
    }

    pub fn debug_key(&self) -> Option<u64> {
        self.debug_key
    }

    pub fn is_debug_reporting(&self) -> bool {
        self.debug_reporting
    }

    pub fn report_spec(&self) -> Option<&ReportSpec> {
        self.report_spec.as_ref()
    }

    pub fn status(&self) -> SourceStatus {
        self.status
    }

    pub fn attribution_mode(&self) -> AttributionMode {
        self.attribution_mode
    }

    pub fn event_report_dedup_keys(&self) -> &[u64] {
        &self.event_report_dedup_keys
    }

    pub fn aggregate_contributions(&self) -> u32 {
        self.aggregate_contributions
    }

    /// Number of distinct trigger data values before truncation.
    pub fn trigger_data_cardinality(&self, policy: &PrivacyPolicy) -> u32 {
        match &self.report_spec {
            Some(spec) => spec.trigger_data_cardinality(),
            None => policy.default_trigger_data_cardinality(self.source_type),
        }
    }

    /// Maximum number of event reports the source can produce.
    pub fn max_event_level_reports(&self, policy: &PrivacyPolicy) -> u32 {
        match &self.report_spec {
            Some(spec) => spec.max_event_level_reports(),
            None => policy.default_max_reports(self.source_type),
        }
    }

    /// Declared filter data plus the implicit `source_type` attribute.
    pub fn filter_map(
        &self,
        policy: &PrivacyPolicy,
    ) -> Result<FilterMap, FilterError> {
        let declared = match &self.filter_data {
            Some(json) => FilterMap::parse_source_filter_data(json, policy)?,
            None => FilterMap::new(),
        };
        Ok(declared.with_source_type(self.source_type))
    }

    pub fn has_event_report_dedup_key(&self, dedup_key: u64) -> bool {
        self.event_report_dedup_keys.contains(&dedup_key)
    }

    pub fn record_event_report_dedup_key(&mut self, dedup_key: u64) {
        if !self.has_event_report_dedup_key(dedup_key) {
            self.event_report_dedup_keys.push(dedup_key);
        }
    }

    pub fn add_aggregate_contributions(&mut self, contributions: u32) {
        self.aggregate_contributions =
            self.aggregate_contributions.saturating_add(contributions);
    }

    /// Moves the source forward in its lifecycle. A source is never
    /// reactivated.
    pub fn set_status(&mut self, next: SourceStatus) -> Result<(), StatusError> {
        if next.rank() < self.status.rank() {
            return Err(StatusError {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn with_attribution_mode(mut self, mode: AttributionMode) -> Self {
        self.attribution_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SpecError;

    #[test]
    fn test_register_defaults() {
        let policy = PrivacyPolicy::default();
        let source =
            Source::register(SourceRegistration::mock(), &policy).unwrap();
        assert_eq!(source.status(), SourceStatus::Active);
        assert_eq!(source.attribution_mode(), AttributionMode::Truthfully);
        assert_eq!(source.event_report_window(), source.expiry_time());
        assert_eq!(source.trigger_data_cardinality(&policy), 8);
        assert_eq!(source.max_event_level_reports(&policy), 3);
        assert!(source.report_spec().is_none());
    }

    #[test]
    fn test_required_fields() {
        let policy = PrivacyPolicy::default();
        let registration = SourceRegistration {
            enrollment_id: String::new(),
            ..SourceRegistration::mock()
        };
        assert!(matches!(
            Source::register(registration, &policy),
            Err(RegistrationError::MissingField("enrollment_id"))
        ));

        let registration = SourceRegistration {
            app_destinations: vec![],
            web_destinations: vec![],
            ..SourceRegistration::mock()
        };
        assert!(matches!(
            Source::register(registration, &policy),
            Err(RegistrationError::NoDestination)
        ));
    }

    #[test]
    fn test_time_bounds() {
        let policy = PrivacyPolicy::default();
        let mock = SourceRegistration::mock();
        let registration = SourceRegistration {
            expiry_time: mock.event_time,
            ..mock.clone()
        };
        assert!(matches!(
            Source::register(registration, &policy),
            Err(RegistrationError::InvalidExpiry { .. })
        ));

        let registration = SourceRegistration {
            event_report_window: Some(mock.expiry_time + 1),
            ..mock
        };
        assert!(matches!(
            Source::register(registration, &policy),
            Err(RegistrationError::InvalidEventReportWindow { .. })
        ));
    }

    #[test]
    fn test_malformed_filter_data_rejected() {
        let registration = SourceRegistration {
            filter_data: Some(r#"{"a": "b"}"#.to_string()),
            ..SourceRegistration::mock()
        };
        assert!(matches!(
            Source::register(registration, &PrivacyPolicy::default()),
            Err(RegistrationError::Filter(_))
        ));
    }

    #[test]
    fn test_flexible_source() {
        let policy = PrivacyPolicy::default();
        let registration = SourceRegistration {
            trigger_specs: Some(
                r#"[{"trigger_data": [1, 2, 3], "event_report_windows": {"end_times": [3600, 86400]}}]"#
                    .to_string(),
            ),
            max_event_level_reports: Some(2),
            ..SourceRegistration::mock()
        };
        let source = Source::register(registration, &policy).unwrap();
        let spec = source.report_spec().unwrap();
        assert_eq!(spec.max_event_level_reports(), 2);
        assert_eq!(source.trigger_data_cardinality(&policy), 3);
        assert_eq!(spec.trigger_specs()[0].summary_buckets(), &[1, 2]);
    }

    #[test]
    fn test_invalid_flexible_source_rejected() {
        let registration = SourceRegistration {
            trigger_specs: Some(
                r#"[{"trigger_data": [1], "event_report_windows": {"end_times": [3600]},
                     "summary_window_operator": "avg"}]"#
                    .to_string(),
            ),
            ..SourceRegistration::mock()
        };
        assert!(matches!(
            Source::register(registration, &PrivacyPolicy::default()),
            Err(RegistrationError::Spec(SpecError::UnknownSummaryOperator(_)))
        ));
    }

    #[test]
    fn test_filter_map_carries_source_type() {
        let policy = PrivacyPolicy::default();
        let source =
            Source::register(SourceRegistration::mock(), &policy).unwrap();
        let filter_map = source.filter_map(&policy).unwrap();
        assert!(filter_map.get("source_type").unwrap().contains("navigation"));
        assert!(filter_map.get("product").is_some());
    }

    #[test]
    fn test_status_never_moves_back() {
        let mut source =
            Source::register(SourceRegistration::mock(), &PrivacyPolicy::default())
                .unwrap();
        source.set_status(SourceStatus::Ignored).unwrap();
        assert!(source.set_status(SourceStatus::Active).is_err());
        source.set_status(SourceStatus::MarkedToDelete).unwrap();
        assert!(source.set_status(SourceStatus::Ignored).is_err());
    }

    #[test]
    fn test_dedup_keys_recorded_once() {
        let mut source =
            Source::register(SourceRegistration::mock(), &PrivacyPolicy::default())
                .unwrap();
        source.record_event_report_dedup_key(7);
        source.record_event_report_dedup_key(7);
        assert_eq!(source.event_report_dedup_keys(), &[7]);
        assert!(source.has_event_report_dedup_key(7));
    }

    #[test]
    fn test_aggregate_contributions_accumulate() {
        let mut source =
            Source::register(SourceRegistration::mock(), &PrivacyPolicy::default())
                .unwrap();
        assert_eq!(source.aggregate_contributions(), 0);
        source.add_aggregate_contributions(300);
        source.add_aggregate_contributions(200);
        assert_eq!(source.aggregate_contributions(), 500);

        // Saturates instead of wrapping.
        source.add_aggregate_contributions(u32::MAX);
        assert_eq!(source.aggregate_contributions(), u32::MAX);
    }
}
