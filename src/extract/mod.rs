//! Candidate extraction
//!
//! Turns one conversation turn into candidate items for the pool. The LLM
//! extractor is the primary path; the keyword extractor is the degraded
//! fallback used whenever the primary errors or runs out of time.

mod keyword;
mod llm;
mod parser;

pub use keyword::KeywordExtractor;
pub use llm::LlmExtractor;
pub use parser::parse_candidates;

use crate::pool::CandidateItem;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One conversation turn handed to an extractor
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Emotion intensity already detected upstream, in [0, 1]
    pub emotion: Option<f64>,
    /// Intent already detected upstream
    pub intent: Option<String>,
}

impl Turn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            emotion: None,
            intent: None,
        }
    }

    pub fn with_emotion(mut self, emotion: f64) -> Self {
        self.emotion = Some(emotion);
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Anything that can turn a turn into candidates
#[async_trait]
pub trait CandidateExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, turn: &Turn) -> Result<Vec<CandidateItem>>;
}

/// Primary extractor bounded by a timeout, with keyword fallback.
///
/// Never fails: an error or timeout from the primary yields the keyword
/// extractor's result instead.
pub struct ResilientExtractor {
    primary: Arc<dyn CandidateExtractor>,
    fallback: KeywordExtractor,
    timeout: Duration,
}

impl ResilientExtractor {
    pub fn new(primary: Arc<dyn CandidateExtractor>, timeout: Duration) -> Self {
        Self {
            primary,
            fallback: KeywordExtractor::new(),
            timeout,
        }
    }

    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }
}

#[async_trait]
impl CandidateExtractor for ResilientExtractor {
    fn name(&self) -> &'static str {
        "resilient"
    }

    async fn extract(&self, turn: &Turn) -> Result<Vec<CandidateItem>> {
        match tokio::time::timeout(self.timeout, self.primary.extract(turn)).await {
            Ok(Ok(candidates)) => {
                debug!("{} extracted {} candidates", self.primary.name(), candidates.len());
                Ok(candidates)
            }
            Ok(Err(e)) => {
                warn!("{} extraction failed, using keyword fallback: {}", self.primary.name(), e);
                Ok(self.fallback.extract_sync(turn))
            }
            Err(_) => {
                warn!(
                    "{} extraction timed out after {:?}, using keyword fallback",
                    self.primary.name(),
                    self.timeout
                );
                Ok(self.fallback.extract_sync(turn))
            }
        }
    }
}
