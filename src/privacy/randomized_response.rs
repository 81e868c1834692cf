use log::debug;

use crate::errors::SpecError;

/// Privacy parameters of a report configuration, derived once from its state
/// count and cached for the lifetime of the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrivacyParams {
    num_states: u128,
    flip_probability: f64,
    information_gain: f64,
}

impl PrivacyParams {
    /// Derives the parameters of epsilon-randomized response over
    /// `num_states` outcomes. The "no report" outcome is one of the states.
    pub fn derive(num_states: u128, epsilon: f64) -> Self {
        let flip_probability = flip_probability(num_states, epsilon);
        let information_gain = information_gain(num_states, flip_probability);
        Self {
            num_states,
            flip_probability,
            information_gain,
        }
    }

    /// Same as [`PrivacyParams::derive`], but rejects configurations leaking
    /// more than `max_information_gain` bits.
    pub fn derive_bounded(
        num_states: u128,
        epsilon: f64,
        max_information_gain: f64,
    ) -> Result<Self, SpecError> {
        let params = Self::derive(num_states, epsilon);
        debug!(
            "{num_states} states: flip probability {}, information gain {} bits (max {max_information_gain})",
            params.flip_probability, params.information_gain
        );
        if params.information_gain > max_information_gain {
            return Err(SpecError::InformationGainExceeded {
                information_gain: params.information_gain,
                max: max_information_gain,
            });
        }
        Ok(params)
    }

    pub fn num_states(&self) -> u128 {
        self.num_states
    }

    /// Probability that the true state is replaced with a uniformly random
    /// one (possibly itself).
    pub fn flip_probability(&self) -> f64 {
        self.flip_probability
    }

    /// Channel capacity, in bits.
    pub fn information_gain(&self) -> f64 {
        self.information_gain
    }

    /// Probability mass the mechanism puts on any given state other than the
    /// true one.
    pub fn random_state_probability(&self) -> f64 {
        self.flip_probability / self.num_states as f64
    }

    /// Probability that the output is the true state.
    pub fn true_state_probability(&self) -> f64 {
        1.0 - self.flip_probability + self.random_state_probability()
    }
}

/// `k / (k + e^epsilon - 1)` for `k` states. Negative epsilons are treated
/// as zero.
///
/// This grows with `k`: holding epsilon fixed over more states takes more
/// flips. What shrinks as `k` grows is the mass on any single state, see
/// [`PrivacyParams::random_state_probability`] and
/// [`PrivacyParams::true_state_probability`].
pub fn flip_probability(num_states: u128, epsilon: f64) -> f64 {
    let k = num_states as f64;
    let exp_epsilon = epsilon.max(0.0).exp();
    k / (k + exp_epsilon - 1.0)
}

/// Capacity of the `k`-ary symmetric channel induced by randomized response
/// with the given flip probability:
/// `log2(k) - h(q) - q * log2(k - 1)`, where `q = p * (k - 1) / k` is the
/// probability of reporting a false state and `h` the binary entropy.
pub fn information_gain(num_states: u128, flip_probability: f64) -> f64 {
    if num_states <= 1 {
        return 0.0;
    }
    let k = num_states as f64;
    let fake_probability = flip_probability * (k - 1.0) / k;
    let gain = k.log2()
        - binary_entropy(fake_probability)
        - fake_probability * (k - 1.0).log2();
    gain.max(0.0)
}

fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
}
