//! Score functions
//!
//! Pure math over one item at a time. Every input is clamped before use, so
//! no combination of raw values can push a score outside `[0, 1]`.

use crate::config::{DecayConfig, ScoreWeights};

/// Clamp to `[0, 1]`, mapping NaN to 0.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// `1 / (1 + (Δt/τ)^β)`. Equals 1 at Δt = 0 and strictly decreases.
pub fn recency(elapsed_secs: f64, tau_secs: f64, beta: f64) -> f64 {
    let dt = if elapsed_secs.is_nan() { 0.0 } else { elapsed_secs.max(0.0) };
    if dt == 0.0 {
        return 1.0;
    }
    let tau = if tau_secs > 0.0 { tau_secs } else { f64::MIN_POSITIVE };
    let beta = if beta > 0.0 { beta.min(1.0) } else { 1.0 };
    1.0 / (1.0 + (dt / tau).powf(beta))
}

/// `min(1, ln(1+count) / ln(1+max_mentions))`
pub fn repetition(count: u64, max_mentions: u64) -> f64 {
    let max_mentions = max_mentions.max(1) as f64;
    let value = (1.0 + count as f64).ln() / (1.0 + max_mentions).ln();
    clamp01(value)
}

/// `min(1, degree / sqrt(max(1, pool_size)))`
pub fn connectivity(degree: usize, pool_size: usize) -> f64 {
    let size = pool_size.max(1) as f64;
    clamp01(degree as f64 / size.sqrt())
}

/// Component scores of one item, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreInputs {
    pub recency: f64,
    pub repetition: f64,
    pub priority: f64,
    pub connectivity: f64,
    pub drift: f64,
}

/// Weighted sum of the clamped components, clamped again.
pub fn composite(inputs: &ScoreInputs, weights: &ScoreWeights) -> f64 {
    let weighted = weights.recency * clamp01(inputs.recency)
        + weights.repetition * clamp01(inputs.repetition)
        + weights.priority * clamp01(inputs.priority)
        + weights.connectivity * clamp01(inputs.connectivity)
        + weights.drift * clamp01(inputs.drift);
    clamp01(weighted)
}

/// Recency using the configured curve.
pub fn recency_with(elapsed_secs: f64, decay: &DecayConfig) -> f64 {
    recency(elapsed_secs, decay.tau_secs, decay.beta)
}
