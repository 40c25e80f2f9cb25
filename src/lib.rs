//! Salience - bounded, decay-scored attention pool
//!
//! Keeps a small ranked working set of what currently matters in a
//! conversation:
//! - Scores items by recency, repetition, priority, connectivity and drift
//! - Merges near-duplicate sightings instead of growing the pool
//! - Tiers items into active / latent / fading and prunes or evicts the rest
//! - Learns item-to-item transitions online to predict emerging items

pub mod config;
pub mod extract;
pub mod pool;
pub mod service;

pub use config::PoolConfig;
pub use extract::{CandidateExtractor, KeywordExtractor, LlmExtractor, ResilientExtractor, Turn};
pub use pool::{
    CandidateItem, CachePolicy, FocusPolicy, Item, ItemId, ItemKind, PoolEvent, ScoredPool,
    Snapshot, Tier,
};
pub use service::PoolHandle;

/// Result type for Salience operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Salience
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Pool service is not running")]
    ServiceClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
