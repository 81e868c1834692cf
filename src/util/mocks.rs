use crate::events::{
    source::{DestinationType, SourceRegistration, SourceType},
    trigger::TriggerRegistration,
};

// Sample mock values to reduce boilerplate in tests.

const EVENT_TIME: u64 = 1_700_000_000_000;
const DAY: u64 = 86_400_000;

impl SourceRegistration {
    /// Sample navigation source, live for 30 days, towards both an app and a
    /// site.
    pub fn mock() -> Self {
        Self {
            id: "source-1".to_string(),
            event_id: 4_242,
            publisher: "android-app://com.blog".to_string(),
            app_destinations: vec!["android-app://com.shoes".to_string()],
            web_destinations: vec!["https://shoes.com".to_string()],
            enrollment_id: "adtech-enrollment".to_string(),
            registrant: "android-app://com.blog".to_string(),
            registration_origin: "https://adtech.com".to_string(),
            source_type: SourceType::Navigation,
            priority: 100,
            event_time: EVENT_TIME,
            expiry_time: EVENT_TIME + 30 * DAY,
            event_report_window: None,
            filter_data: Some(
                r#"{"product": ["shoes", "socks"], "campaign": ["summer"]}"#
                    .to_string(),
            ),
            aggregate_source: None,
            install_attributed: false,
            debug_key: None,
            debug_reporting: false,
            trigger_specs: None,
            max_event_level_reports: None,
        }
    }
}

impl TriggerRegistration {
    /// Sample conversion on the mock source's app, one day after the source.
    pub fn mock() -> Self {
        Self {
            id: "trigger-1".to_string(),
            attribution_destination: "android-app://com.shoes".to_string(),
            destination_type: DestinationType::App,
            enrollment_id: "adtech-enrollment".to_string(),
            registrant: "android-app://com.shoes".to_string(),
            trigger_time: EVENT_TIME + DAY,
            event_triggers: r#"[{"trigger_data": "1", "priority": "100"}]"#
                .to_string(),
            aggregate_trigger_data: None,
            aggregate_values: None,
            aggregate_deduplication_keys: None,
            filters: None,
            not_filters: None,
            debug_key: None,
            debug_reporting: false,
        }
    }
}
