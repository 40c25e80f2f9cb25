//! Pool configuration
//!
//! Every threshold, interval and weight the pool uses is a named value here.
//! Config can be built in code with the `with_*` methods or loaded from TOML:
//!
//! ```toml
//! similarity_threshold = 0.7
//! tick_interval_secs = 60
//!
//! [weights]
//! recency = 0.25
//! repetition = 0.20
//! priority = 0.15
//! connectivity = 0.20
//! drift = 0.20
//!
//! [cache]
//! capacity = 200
//! reserved_pinned_slots = 20
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Weights of the composite score. Intended to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub recency: f64,
    pub repetition: f64,
    pub priority: f64,
    pub connectivity: f64,
    pub drift: f64,
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.recency + self.repetition + self.priority + self.connectivity + self.drift
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            recency: 0.25,
            repetition: 0.20,
            priority: 0.15,
            connectivity: 0.20,
            drift: 0.20,
        }
    }
}

/// Recency and repetition curve parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Decay half-life τ in seconds
    pub tau_secs: f64,
    /// Tail exponent β in (0, 1]; smaller means a heavier tail
    pub beta: f64,
    /// Mention count at which repetition saturates
    pub max_mentions: u64,
    /// Number of mention timestamps kept per item
    pub mention_history: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            tau_secs: 300.0,
            beta: 0.7,
            max_mentions: 10,
            mention_history: 20,
        }
    }
}

/// Tier sizes and score floors used by reclassification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub min_active: usize,
    pub max_active: usize,
    pub max_latent: usize,
    /// Score needed to be active when fewer than `max_active` items compete
    pub active_floor: f64,
    /// Score needed to be latent
    pub latent_floor: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            min_active: 3,
            max_active: 12,
            max_latent: 8,
            active_floor: 0.3,
            latent_floor: 0.2,
        }
    }
}

/// Removal of stale fading items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Minimum seconds since the last update before an item can be pruned
    pub staleness_window_secs: u64,
    /// Items scoring below this floor are eligible
    pub min_score_floor: f64,
}

impl PruneConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            staleness_window_secs: 1800,
            min_score_floor: 0.1,
        }
    }
}

/// Transition model sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Capacity of the recent-sequence buffer
    pub sequence_capacity: usize,
    /// How many sequence tail entries feed emerging predictions
    pub prediction_window: usize,
    /// Window for the mention-recency part of drift momentum
    pub momentum_window_secs: u64,
    /// Strength added per observed transition
    pub transition_strength: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            sequence_capacity: 20,
            prediction_window: 5,
            momentum_window_secs: 300,
            transition_strength: 1.0,
        }
    }
}

/// Capacity bound for the cache variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub reserved_pinned_slots: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            reserved_pinned_slots: 20,
        }
    }
}

/// Settings for the LLM-backed candidate extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Hard limit for one extraction call, retries included
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Apply `SALIENCE_MODEL` / `SALIENCE_BASE_URL` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("SALIENCE_MODEL") {
            if !model.trim().is_empty() {
                self.model = model.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("SALIENCE_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        self
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 10,
            max_tokens: 1024,
            temperature: 0.1,
        }
    }
}

/// Configuration for a scored pool and the service around it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub weights: ScoreWeights,
    pub decay: DecayConfig,
    pub tiers: TierConfig,
    pub prune: PruneConfig,
    pub transitions: TransitionConfig,

    /// Token Jaccard needed to merge two labels of the same kind
    pub similarity_threshold: f64,

    /// Weight of a new sighting's priority when blending into an existing item
    pub priority_blend: f64,

    /// Period of the background decay tick
    pub tick_interval_secs: u64,

    /// Capacity bound; `None` disables eviction
    pub cache: Option<CacheConfig>,

    pub extractor: ExtractorConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            decay: DecayConfig::default(),
            tiers: TierConfig::default(),
            prune: PruneConfig::default(),
            transitions: TransitionConfig::default(),
            similarity_threshold: 0.7,
            priority_blend: 0.3,
            tick_interval_secs: 60,
            cache: None,
            extractor: ExtractorConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location: `<config dir>/salience/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("salience").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded pool config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if given, else from the default location if it
    /// exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Reject values the scoring math cannot work with. Weight sums are only
    /// warned about.
    pub fn validate(&self) -> Result<()> {
        if !(self.decay.tau_secs > 0.0) {
            return Err(Error::Config(format!(
                "decay.tau_secs must be positive, got {}",
                self.decay.tau_secs
            )));
        }
        if !(self.decay.beta > 0.0 && self.decay.beta <= 1.0) {
            return Err(Error::Config(format!(
                "decay.beta must be in (0, 1], got {}",
                self.decay.beta
            )));
        }
        if self.tiers.min_active > self.tiers.max_active {
            return Err(Error::Config(format!(
                "tiers.min_active ({}) exceeds tiers.max_active ({})",
                self.tiers.min_active, self.tiers.max_active
            )));
        }
        if self.tick_interval_secs == 0 {
            return Err(Error::Config("tick_interval_secs must be at least 1".to_string()));
        }
        let total = self.weights.total();
        if (total - 1.0).abs() > 0.01 {
            warn!("Score weights sum to {:.3}, composite scores will be skewed", total);
        }
        Ok(())
    }

    /// Decay tick period; never shorter than one second.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_decay(mut self, tau_secs: f64, beta: f64) -> Self {
        self.decay.tau_secs = tau_secs;
        self.decay.beta = beta;
        self
    }

    pub fn with_tiers(mut self, min_active: usize, max_active: usize, max_latent: usize) -> Self {
        self.tiers.min_active = min_active;
        self.tiers.max_active = max_active;
        self.tiers.max_latent = max_latent;
        self
    }

    pub fn with_prune(mut self, staleness_window_secs: u64, min_score_floor: f64) -> Self {
        self.prune.staleness_window_secs = staleness_window_secs;
        self.prune.min_score_floor = min_score_floor;
        self
    }

    pub fn with_cache(mut self, capacity: usize, reserved_pinned_slots: usize) -> Self {
        self.cache = Some(CacheConfig {
            capacity,
            reserved_pinned_slots,
        });
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_tick_interval(mut self, secs: u64) -> Self {
        self.tick_interval_secs = secs;
        self
    }
}
