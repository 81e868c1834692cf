//! Matching of trigger filter sets against a source's filter map.
//! Mirrors https://github.com/WICG/attribution-reporting-api/blob/main/EVENT.md#optional-attribution-filters.

use crate::filtering::filter_map::FilterMap;

/// Checks a single trigger filter map against the source.
///
/// Keys absent from the source are ignored. For a shared key, the value sets
/// must intersect, or both be empty. A lookback window additionally requires
/// the source to be at most that many seconds older than the trigger.
///
/// With `negate`, every check is inverted per key: shared keys must have
/// disjoint values (a non-empty source list for an empty trigger list), and
/// the source must be older than the lookback window.
pub fn is_map_match(
    source: &FilterMap,
    trigger_map: &FilterMap,
    elapsed_seconds: u64,
    negate: bool,
) -> bool {
    if let Some(lookback) = trigger_map.lookback_window() {
        if (elapsed_seconds <= lookback) == negate {
            return false;
        }
    }

    trigger_map.iter().all(|(key, trigger_values)| {
        let Some(source_values) = source.get(key) else {
            return true;
        };
        let matches = if trigger_values.is_empty() {
            source_values.is_empty()
        } else {
            !source_values.is_disjoint(trigger_values)
        };
        matches != negate
    })
}

/// A filter set matches if any of its maps matches. An empty set always
/// matches.
pub fn is_filter_set_match(
    source: &FilterMap,
    filter_set: &[FilterMap],
    elapsed_seconds: u64,
) -> bool {
    filter_set.is_empty()
        || filter_set
            .iter()
            .any(|map| is_map_match(source, map, elapsed_seconds, false))
}

/// A not-filter set passes if any of its maps passes the negated check. An
/// empty set always passes.
pub fn is_not_filter_set_match(
    source: &FilterMap,
    not_filter_set: &[FilterMap],
    elapsed_seconds: u64,
) -> bool {
    not_filter_set.is_empty()
        || not_filter_set
            .iter()
            .any(|map| is_map_match(source, map, elapsed_seconds, true))
}

/// Decides whether a trigger carrying the given (optional) filter and
/// not-filter sets may attribute to a source with filter map `source`.
pub fn is_eligible(
    source: &FilterMap,
    filters: Option<&[FilterMap]>,
    not_filters: Option<&[FilterMap]>,
    elapsed_seconds: u64,
) -> bool {
    let filters_pass = match filters {
        Some(set) => is_filter_set_match(source, set, elapsed_seconds),
        None => true,
    };
    let not_filters_pass = match not_filters {
        Some(set) => is_not_filter_set_match(source, set, elapsed_seconds),
        None => true,
    };
    filters_pass && not_filters_pass
}
