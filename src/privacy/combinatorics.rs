//! Exact counting of the output states of a report configuration.
//!
//! A state assigns a number of reports to every (trigger data, window) slot,
//! such that each trigger data type stays within its cap and all types
//! together stay within the global report ceiling. Equivalently, for each type
//! a non-decreasing "bucket index reached" per window, bounded by the cap.
//!
//! The count follows the recurrence
//!
//! ```text
//! S(r, t, w, c) = sum_{i = 0}^{min(r, c)} S(r - i, t, w - 1, c - i)   if w > 0
//! S(r, t, 0, _) = S(r, t - 1, W[t - 1], C[t - 1])                      if t > 0
//! S(r, 0, 0, _) = 1
//! ```
//!
//! over remaining reports `r`, type `t`, remaining windows `w` and remaining
//! cap `c`, starting from the last type. With every cap at least the global
//! ceiling `k`, this reduces to stars and bars: `C(slots + k, k)`.
//!
//! Inputs are bounded by the policy (at most 20 reports over at most 32 * 5
//! slots), so the largest count, `C(180, 20) < 2^88`, fits in a `u128`.
//! Additions are still checked.

use std::collections::HashMap;

use crate::{config::policy::PrivacyPolicy, errors::SpecError};

type MemoKey = (u32, usize, u32, u32);

/// State counter for one report configuration, memoizing the recurrence so
/// that counting and unranking share work.
#[derive(Debug, Clone)]
pub struct StateCounter {
    max_reports: u32,
    per_type_num_windows: Vec<u32>,
    per_type_caps: Vec<u32>,
    memo: HashMap<MemoKey, u128>,
}

impl StateCounter {
    /// Validates the configuration against the policy ceilings.
    pub fn new(
        max_reports: u32,
        per_type_num_windows: Vec<u32>,
        per_type_caps: Vec<u32>,
        policy: &PrivacyPolicy,
    ) -> Result<Self, SpecError> {
        if max_reports == 0 || max_reports > policy.max_flexible_event_reports
        {
            return Err(SpecError::InvalidMaxReports {
                max_reports,
                ceiling: policy.max_flexible_event_reports,
            });
        }
        if per_type_num_windows.len() != per_type_caps.len() {
            return Err(SpecError::MismatchedLengths {
                windows: per_type_num_windows.len(),
                caps: per_type_caps.len(),
            });
        }
        if per_type_num_windows.is_empty() {
            return Err(SpecError::Empty {
                field: "trigger_data",
            });
        }
        let max_cardinality = policy.max_trigger_data_cardinality as usize;
        if per_type_num_windows.len() > max_cardinality {
            return Err(SpecError::TooManyEntries {
                field: "trigger_data",
                len: per_type_num_windows.len(),
                max: max_cardinality,
            });
        }
        for (index, num_windows) in per_type_num_windows.iter().enumerate() {
            if *num_windows == 0 {
                return Err(SpecError::NoWindows { index });
            }
            if *num_windows > policy.max_report_windows {
                return Err(SpecError::TooManyEntries {
                    field: "end_times",
                    len: *num_windows as usize,
                    max: policy.max_report_windows as usize,
                });
            }
        }
        for cap in &per_type_caps {
            if *cap > policy.max_flexible_event_reports {
                return Err(SpecError::TooManyEntries {
                    field: "summary_buckets",
                    len: *cap as usize,
                    max: policy.max_flexible_event_reports as usize,
                });
            }
        }

        Ok(Self {
            max_reports,
            per_type_num_windows,
            per_type_caps,
            memo: HashMap::new(),
        })
    }

    pub fn num_types(&self) -> usize {
        self.per_type_num_windows.len()
    }

    /// Number of distinct states, including the state with no report.
    pub fn num_states(&mut self) -> Result<u128, SpecError> {
        let last = self.num_types() - 1;
        self.count(
            self.max_reports,
            last,
            self.per_type_num_windows[last],
            self.per_type_caps[last],
        )
    }

    /// Decodes state `rank` (in `0..num_states`) into report counts, indexed
    /// by trigger data type, then window.
    pub fn state_at(&mut self, rank: u128) -> Result<Vec<Vec<u32>>, SpecError> {
        let num_states = self.num_states()?;
        if rank >= num_states {
            return Err(SpecError::RankOutOfRange { rank, num_states });
        }

        let mut counts: Vec<Vec<u32>> = self
            .per_type_num_windows
            .iter()
            .map(|num_windows| vec![0; *num_windows as usize])
            .collect();

        let mut rank = rank;
        let mut remaining = self.max_reports;
        let mut index = self.num_types() - 1;
        let mut windows = self.per_type_num_windows[index];
        let mut cap = self.per_type_caps[index];
        loop {
            if windows == 0 {
                if index == 0 {
                    break;
                }
                index -= 1;
                windows = self.per_type_num_windows[index];
                cap = self.per_type_caps[index];
                continue;
            }

            let mut chosen = None;
            for i in 0..=remaining.min(cap) {
                let below =
                    self.count(remaining - i, index, windows - 1, cap - i)?;
                if rank < below {
                    chosen = Some(i);
                    break;
                }
                rank -= below;
            }
            let i = chosen
                .ok_or(SpecError::RankOutOfRange { rank, num_states })?;
            counts[index][(windows - 1) as usize] = i;
            remaining -= i;
            cap -= i;
            windows -= 1;
        }
        Ok(counts)
    }

    fn count(
        &mut self,
        remaining: u32,
        index: usize,
        windows: u32,
        cap: u32,
    ) -> Result<u128, SpecError> {
        let key = (remaining, index, windows, cap);
        if let Some(cached) = self.memo.get(&key) {
            return Ok(*cached);
        }

        let result = if windows == 0 && index == 0 {
            1
        } else if windows == 0 {
            let previous_windows = self.per_type_num_windows[index - 1];
            let previous_cap = self.per_type_caps[index - 1];
            self.count(remaining, index - 1, previous_windows, previous_cap)?
        } else {
            let mut total: u128 = 0;
            for i in 0..=remaining.min(cap) {
                let below =
                    self.count(remaining - i, index, windows - 1, cap - i)?;
                total = total
                    .checked_add(below)
                    .ok_or(SpecError::StateCountOverflow)?;
            }
            total
        };

        self.memo.insert(key, result);
        Ok(result)
    }
}

/// Convenience wrapper around [`StateCounter::num_states`].
pub fn num_states(
    max_reports: u32,
    per_type_num_windows: &[u32],
    per_type_caps: &[u32],
    policy: &PrivacyPolicy,
) -> Result<u128, SpecError> {
    StateCounter::new(
        max_reports,
        per_type_num_windows.to_vec(),
        per_type_caps.to_vec(),
        policy,
    )?
    .num_states()
}
