use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::{
    config::policy::PrivacyPolicy, errors::FilterError,
    events::source::SourceType,
};

/// Implicit key carried by every source's filter map.
pub const SOURCE_TYPE_KEY: &str = "source_type";

/// Reserved trigger-side key restricting matches to recent sources.
pub const LOOKBACK_WINDOW_KEY: &str = "_lookback_window";

/// Attribute key to allowed-values mapping.
///
/// Values are kept in ordered sets, so two maps declaring the same values in a
/// different order compare equal. Trigger-side maps may also carry a lookback
/// window, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterMap {
    attributes: BTreeMap<String, BTreeSet<String>>,
    lookback_window: Option<u64>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from key/values pairs, mostly useful in tests.
    pub fn from_pairs<K, V, I>(pairs: impl IntoIterator<Item = (K, I)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = V>,
    {
        let attributes = pairs
            .into_iter()
            .map(|(key, values)| {
                (key.into(), values.into_iter().map(Into::into).collect())
            })
            .collect();
        Self {
            attributes,
            lookback_window: None,
        }
    }

    pub fn with_lookback_window(mut self, seconds: u64) -> Self {
        self.lookback_window = Some(seconds);
        self
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.attributes.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.attributes.iter()
    }

    pub fn lookback_window(&self) -> Option<u64> {
        self.lookback_window
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.lookback_window.is_none()
    }

    /// Returns a copy with the implicit `source_type` attribute set.
    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.attributes.insert(
            SOURCE_TYPE_KEY.to_string(),
            BTreeSet::from([source_type.as_str().to_string()]),
        );
        self
    }

    /// Parses a source's declarative filter data. Sources may not declare the
    /// reserved keys, nor a lookback window.
    pub fn parse_source_filter_data(
        json: &str,
        policy: &PrivacyPolicy,
    ) -> Result<Self, FilterError> {
        let value: Value = serde_json::from_str(json)?;
        let object = expect_object(&value)?;
        for reserved in [SOURCE_TYPE_KEY, LOOKBACK_WINDOW_KEY] {
            if object.contains_key(reserved) {
                return Err(FilterError::ReservedKey(reserved.to_string()));
            }
        }
        Self::from_object(object, policy)
    }

    /// Parses one trigger-side filter map.
    pub fn from_value(
        value: &Value,
        policy: &PrivacyPolicy,
    ) -> Result<Self, FilterError> {
        Self::from_object(expect_object(value)?, policy)
    }

    fn from_object(
        object: &Map<String, Value>,
        policy: &PrivacyPolicy,
    ) -> Result<Self, FilterError> {
        if object.len() > policy.max_attribution_filters {
            return Err(FilterError::TooManyEntries {
                what: "filter map",
                len: object.len(),
                max: policy.max_attribution_filters,
            });
        }

        let mut this = Self::new();
        for (key, value) in object {
            if key == LOOKBACK_WINDOW_KEY {
                let seconds =
                    value.as_u64().ok_or_else(|| FilterError::InvalidValue {
                        key: key.clone(),
                        expected: "a non-negative integer",
                    })?;
                this.lookback_window = Some(seconds);
                continue;
            }

            check_length(key, policy)?;
            let values = value.as_array().ok_or_else(|| {
                FilterError::InvalidValue {
                    key: key.clone(),
                    expected: "an array of strings",
                }
            })?;
            if values.len() > policy.max_values_per_attribution_filter {
                return Err(FilterError::TooManyEntries {
                    what: "filter values",
                    len: values.len(),
                    max: policy.max_values_per_attribution_filter,
                });
            }

            let mut set = BTreeSet::new();
            for value in values {
                let value =
                    value.as_str().ok_or_else(|| FilterError::InvalidValue {
                        key: key.clone(),
                        expected: "an array of strings",
                    })?;
                check_length(value, policy)?;
                set.insert(value.to_string());
            }
            this.attributes.insert(key.clone(), set);
        }
        Ok(this)
    }

    pub fn to_value(&self) -> Value {
        let mut object: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(key, values)| {
                let values =
                    values.iter().cloned().map(Value::String).collect();
                (key.clone(), Value::Array(values))
            })
            .collect();
        if let Some(seconds) = self.lookback_window {
            object.insert(LOOKBACK_WINDOW_KEY.to_string(), seconds.into());
        }
        Value::Object(object)
    }
}

/// Parses a trigger filter set. Both a single map and an array of maps are
/// accepted, the former being shorthand for a one-element set.
pub fn parse_filter_set(
    value: &Value,
    policy: &PrivacyPolicy,
) -> Result<Vec<FilterMap>, FilterError> {
    let maps = match value {
        Value::Array(items) => {
            if items.len() > policy.max_filter_maps_per_filter_set {
                return Err(FilterError::TooManyEntries {
                    what: "filter set",
                    len: items.len(),
                    max: policy.max_filter_maps_per_filter_set,
                });
            }
            items
                .iter()
                .map(|item| FilterMap::from_value(item, policy))
                .collect::<Result<Vec<_>, _>>()?
        }
        other => vec![FilterMap::from_value(other, policy)?],
    };
    Ok(maps)
}

/// String form of [`parse_filter_set`], for the top-level trigger fields.
pub fn parse_filter_set_str(
    json: &str,
    policy: &PrivacyPolicy,
) -> Result<Vec<FilterMap>, FilterError> {
    let value: Value = serde_json::from_str(json)?;
    parse_filter_set(&value, policy)
}

fn expect_object(value: &Value) -> Result<&Map<String, Value>, FilterError> {
    value.as_object().ok_or_else(|| FilterError::InvalidValue {
        key: String::new(),
        expected: "an object",
    })
}

fn check_length(s: &str, policy: &PrivacyPolicy) -> Result<(), FilterError> {
    if s.len() > policy.max_bytes_per_attribution_filter_string {
        return Err(FilterError::StringTooLong(s.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_insensitive_equality() {
        let a = FilterMap::from_pairs([("type", ["a", "b"])]);
        let b = FilterMap::from_pairs([("type", ["b", "a", "b"])]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_source_filter_data() {
        let policy = PrivacyPolicy::default();
        let map = FilterMap::parse_source_filter_data(
            r#"{"product": ["1234", "2345"], "ctid": ["id"]}"#,
            &policy,
        )
        .unwrap();
        assert_eq!(map.get("product").unwrap().len(), 2);
        assert!(map.get("missing").is_none());
    }

    #[test]
    fn test_reserved_keys_rejected() {
        let policy = PrivacyPolicy::default();
        let err = FilterMap::parse_source_filter_data(
            r#"{"source_type": ["event"]}"#,
            &policy,
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::ReservedKey(_)));
        assert!(FilterMap::parse_source_filter_data(
            r#"{"_lookback_window": 10}"#,
            &policy
        )
        .is_err());
    }

    #[test]
    fn test_malformed_values_rejected() {
        let policy = PrivacyPolicy::default();
        assert!(matches!(
            FilterMap::parse_source_filter_data(r#"{"a": "b"}"#, &policy),
            Err(FilterError::InvalidValue { .. })
        ));
        assert!(matches!(
            FilterMap::parse_source_filter_data(r#"{"a": [1]}"#, &policy),
            Err(FilterError::InvalidValue { .. })
        ));
        assert!(matches!(
            FilterMap::parse_source_filter_data("[", &policy),
            Err(FilterError::Malformed(_))
        ));
    }

    #[test]
    fn test_policy_limits() {
        let policy = PrivacyPolicy {
            max_values_per_attribution_filter: 1,
            ..Default::default()
        };
        assert!(matches!(
            FilterMap::parse_source_filter_data(r#"{"a": ["x", "y"]}"#, &policy),
            Err(FilterError::TooManyEntries { .. })
        ));

        let long = "x".repeat(26);
        let json = format!(r#"{{"a": ["{long}"]}}"#);
        assert!(matches!(
            FilterMap::parse_source_filter_data(&json, &PrivacyPolicy::default()),
            Err(FilterError::StringTooLong(_))
        ));
    }

    #[test]
    fn test_parse_filter_set_shapes() {
        let policy = PrivacyPolicy::default();
        let single =
            parse_filter_set_str(r#"{"type": ["a"], "_lookback_window": 100}"#, &policy)
                .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].lookback_window(), Some(100));

        let many =
            parse_filter_set_str(r#"[{"type": ["a"]}, {"type": ["b"]}]"#, &policy)
                .unwrap();
        assert_eq!(many.len(), 2);

        assert!(parse_filter_set_str(
            r#"{"_lookback_window": -1}"#,
            &policy
        )
        .is_err());
    }

    #[test]
    fn test_to_value_reparses() {
        let policy = PrivacyPolicy::default();
        let map = FilterMap::from_pairs([("k", ["v2", "v1"])])
            .with_lookback_window(30);
        let reparsed = FilterMap::from_value(&map.to_value(), &policy).unwrap();
        assert_eq!(map, reparsed);
    }
}
