use serde::{Deserialize, Serialize};

use crate::events::source::SourceType;

const ONE_HOUR_SECONDS: u64 = 60 * 60;
const ONE_DAY_SECONDS: u64 = 24 * ONE_HOUR_SECONDS;

/// Fixed privacy-policy ceilings and defaults.
///
/// Every operation that validates a registration or derives privacy
/// parameters takes a `&PrivacyPolicy` explicitly; there is no process-wide
/// instance. Durations are in seconds, like the declarative formats that
/// reference them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrivacyPolicy {
    /// Upper bound on `max_event_level_reports` for a flexible spec, and on
    /// the number of summary buckets of any single trigger spec.
    pub max_flexible_event_reports: u32,

    /// Maximum number of distinct trigger data values across a report spec.
    pub max_trigger_data_cardinality: u32,

    /// Maximum number of `end_times` in one trigger spec.
    pub max_report_windows: u32,

    /// Smallest allowed window end, relative to the source event time.
    pub min_report_window_seconds: u64,

    /// Maximum number of filter maps in a trigger filter set.
    pub max_filter_maps_per_filter_set: usize,

    /// Maximum number of keys in a single filter map.
    pub max_attribution_filters: usize,

    /// Maximum number of values for a single filter key.
    pub max_values_per_attribution_filter: usize,

    /// Maximum length, in bytes, of filter keys and values.
    pub max_bytes_per_attribution_filter_string: usize,

    /// Epsilon of the randomized response mechanism applied to sources.
    pub privacy_epsilon: f64,

    /// Information gain ceiling, in bits, for event sources.
    pub max_information_gain_event: f64,

    /// Information gain ceiling, in bits, for navigation sources.
    pub max_information_gain_navigation: f64,

    /// Randomized trigger rate of event sources without a flexible spec.
    pub event_noise_probability: f64,

    /// Randomized trigger rate of navigation sources without a flexible spec.
    pub navigation_noise_probability: f64,

    pub event_trigger_data_cardinality: u32,
    pub navigation_trigger_data_cardinality: u32,

    pub event_max_reports: u32,
    pub navigation_max_reports: u32,

    /// Early window ends for navigation sources. The source's own event
    /// report window always closes the list.
    pub navigation_early_windows_seconds: Vec<u64>,

    /// Early window ends for install-attributed event sources reporting to an
    /// app destination.
    pub install_attributed_event_early_windows_seconds: Vec<u64>,

    /// Delay between a window closing and its reports being delivered.
    pub report_delivery_delay_seconds: u64,
}

impl Default for PrivacyPolicy {
    fn default() -> Self {
        Self {
            max_flexible_event_reports: 20,
            max_trigger_data_cardinality: 32,
            max_report_windows: 5,
            min_report_window_seconds: ONE_HOUR_SECONDS,
            max_filter_maps_per_filter_set: 20,
            max_attribution_filters: 50,
            max_values_per_attribution_filter: 50,
            max_bytes_per_attribution_filter_string: 25,
            privacy_epsilon: 14.0,
            max_information_gain_event: 6.5,
            max_information_gain_navigation: 11.46173,
            event_noise_probability: 0.0000025,
            navigation_noise_probability: 0.0024263,
            event_trigger_data_cardinality: 2,
            navigation_trigger_data_cardinality: 8,
            event_max_reports: 1,
            navigation_max_reports: 3,
            navigation_early_windows_seconds: vec![
                2 * ONE_DAY_SECONDS,
                7 * ONE_DAY_SECONDS,
            ],
            install_attributed_event_early_windows_seconds: vec![
                2 * ONE_DAY_SECONDS,
            ],
            report_delivery_delay_seconds: ONE_HOUR_SECONDS,
        }
    }
}

impl PrivacyPolicy {
    /// Loads a policy from a JSON document. Missing fields keep their
    /// defaults, unknown fields are rejected.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn max_information_gain(&self, source_type: SourceType) -> f64 {
        match source_type {
            SourceType::Event => self.max_information_gain_event,
            SourceType::Navigation => self.max_information_gain_navigation,
        }
    }

    pub fn default_trigger_data_cardinality(
        &self,
        source_type: SourceType,
    ) -> u32 {
        match source_type {
            SourceType::Event => self.event_trigger_data_cardinality,
            SourceType::Navigation => self.navigation_trigger_data_cardinality,
        }
    }

    pub fn default_max_reports(&self, source_type: SourceType) -> u32 {
        match source_type {
            SourceType::Event => self.event_max_reports,
            SourceType::Navigation => self.navigation_max_reports,
        }
    }

    pub fn default_noise_probability(&self, source_type: SourceType) -> f64 {
        match source_type {
            SourceType::Event => self.event_noise_probability,
            SourceType::Navigation => self.navigation_noise_probability,
        }
    }
}
