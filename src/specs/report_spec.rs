use std::collections::HashSet;

use log::debug;
use serde_json::Value;

use crate::{
    config::policy::PrivacyPolicy,
    errors::SpecError,
    events::source::SourceType,
    privacy::{
        combinatorics::StateCounter, randomized_response::PrivacyParams,
    },
    specs::trigger_spec::TriggerSpec,
};

/// All trigger specs of a flexible source, with the privacy parameters they
/// induce.
///
/// The parameters are computed once, when the spec is built, and never
/// recomputed: a `ReportSpec` only exists if its configuration passed the
/// information gain ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSpec {
    trigger_specs: Vec<TriggerSpec>,
    max_event_level_reports: u32,
    privacy_params: PrivacyParams,
}

impl ReportSpec {
    pub fn new(
        trigger_specs: Vec<TriggerSpec>,
        max_event_level_reports: u32,
        source_type: SourceType,
        policy: &PrivacyPolicy,
    ) -> Result<Self, SpecError> {
        if trigger_specs.is_empty() {
            return Err(SpecError::Empty {
                field: "trigger_specs",
            });
        }

        let mut seen = HashSet::new();
        for spec in &trigger_specs {
            for value in spec.trigger_data() {
                if !seen.insert(*value) {
                    return Err(SpecError::DuplicateTriggerData(*value));
                }
            }
        }

        let (per_type_num_windows, per_type_caps) =
            flatten(&trigger_specs);
        let num_states = StateCounter::new(
            max_event_level_reports,
            per_type_num_windows,
            per_type_caps,
            policy,
        )?
        .num_states()?;

        let privacy_params = PrivacyParams::derive_bounded(
            num_states,
            policy.privacy_epsilon,
            policy.max_information_gain(source_type),
        )?;
        debug!(
            "Compiled report spec with {} trigger data over {} specs",
            seen.len(),
            trigger_specs.len()
        );

        Ok(Self {
            trigger_specs,
            max_event_level_reports,
            privacy_params,
        })
    }

    /// Compiles the declarative `trigger_specs` array of a source.
    pub fn from_json(
        trigger_specs: &str,
        max_event_level_reports: u32,
        source_type: SourceType,
        policy: &PrivacyPolicy,
    ) -> Result<Self, SpecError> {
        let value: Value = serde_json::from_str(trigger_specs)?;
        let items = match value {
            Value::Array(items) => items,
            _ => {
                return Err(SpecError::Malformed(serde::de::Error::custom(
                    "trigger_specs must be an array",
                )))
            }
        };
        let specs = items
            .iter()
            .map(|item| {
                TriggerSpec::from_value(item, max_event_level_reports, policy)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(specs, max_event_level_reports, source_type, policy)
    }

    /// Declarative `trigger_specs` array.
    pub fn to_json(&self) -> String {
        let items: Vec<Value> =
            self.trigger_specs.iter().map(TriggerSpec::to_value).collect();
        Value::Array(items).to_string()
    }

    pub fn trigger_specs(&self) -> &[TriggerSpec] {
        &self.trigger_specs
    }

    pub fn max_event_level_reports(&self) -> u32 {
        self.max_event_level_reports
    }

    pub fn privacy_params(&self) -> &PrivacyParams {
        &self.privacy_params
    }

    /// Number of report windows per trigger data, flattened across specs.
    pub fn per_type_num_windows(&self) -> Vec<u32> {
        flatten(&self.trigger_specs).0
    }

    /// Number of summary buckets per trigger data, flattened across specs.
    pub fn per_type_caps(&self) -> Vec<u32> {
        flatten(&self.trigger_specs).1
    }

    pub fn trigger_data_cardinality(&self) -> u32 {
        self.trigger_specs
            .iter()
            .map(|spec| spec.trigger_data().len() as u32)
            .sum()
    }

    /// Raw trigger data value at a flattened index.
    pub fn trigger_data_value(&self, index: usize) -> Option<u32> {
        self.trigger_specs
            .iter()
            .flat_map(|spec| spec.trigger_data().iter().copied())
            .nth(index)
    }

    /// Window end, in seconds after the source event, of window
    /// `window_index` for the trigger data at a flattened index.
    pub fn window_end_time(
        &self,
        index: usize,
        window_index: usize,
    ) -> Option<u64> {
        self.spec_at_index(index)?
            .event_report_windows()
            .end_times()
            .get(window_index)
            .copied()
    }

    /// The trigger spec covering a raw trigger data value.
    pub fn spec_for_trigger_data(&self, value: u32) -> Option<&TriggerSpec> {
        self.trigger_specs
            .iter()
            .find(|spec| spec.trigger_data().contains(&value))
    }

    pub fn contains_trigger_data(&self, value: u32) -> bool {
        self.spec_for_trigger_data(value).is_some()
    }

    fn spec_at_index(&self, index: usize) -> Option<&TriggerSpec> {
        self.trigger_specs
            .iter()
            .flat_map(|spec| spec.trigger_data().iter().map(move |_| spec))
            .nth(index)
    }
}

fn flatten(trigger_specs: &[TriggerSpec]) -> (Vec<u32>, Vec<u32>) {
    trigger_specs
        .iter()
        .flat_map(|spec| {
            spec.trigger_data()
                .iter()
                .map(move |_| (spec.num_windows(), spec.cap()))
        })
        .unzip()
}
