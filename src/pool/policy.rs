//! Pool policies
//!
//! The focus pool and the conversation cache share all of their math. What
//! differs is how a sighting merges into an existing item, what happens on
//! insert, and how eviction weighs items. Those three hooks live here.

use super::item::{CachePriority, CandidateItem, Item};
use super::score::{clamp01, repetition};
use chrono::{DateTime, Utc};

/// Merge and eviction behaviour of a [`ScoredPool`](super::ScoredPool)
pub trait PoolPolicy: Send + Sync + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Fold a new sighting into an existing item.
    fn merge(&self, existing: &mut Item, candidate: &CandidateItem, ctx: &MergeContext) {
        merge_sighting(existing, candidate, ctx);
    }

    /// Adjust a freshly created item before it enters the pool.
    fn on_insert(&self, _item: &mut Item) {}

    /// Weight used to pick eviction victims; lowest goes first.
    fn eviction_weight(&self, item: &Item, _max_mentions: u64) -> f64 {
        item.scores.composite
    }
}

/// Values a merge needs from the pool configuration
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    pub now: DateTime<Utc>,
    pub priority_blend: f64,
    pub mention_history: usize,
}

/// Shared merge: record the mention, union aliases, blend priority
/// (`blend·new + (1-blend)·old`, only when the sighting carries one), merge
/// metadata, drop manual overrides.
pub fn merge_sighting(existing: &mut Item, candidate: &CandidateItem, ctx: &MergeContext) {
    existing.record_mention(ctx.now, ctx.mention_history);

    let label = candidate.label.trim();
    if !label.is_empty() && !label.eq_ignore_ascii_case(&existing.label) {
        existing.aliases.insert(label.to_string());
    }
    for alias in &candidate.aliases {
        let alias = alias.trim();
        if !alias.is_empty() && !alias.eq_ignore_ascii_case(&existing.label) {
            existing.aliases.insert(alias.to_string());
        }
    }

    if let Some(priority) = candidate.priority {
        let blend = clamp01(ctx.priority_blend);
        existing.priority = clamp01(blend * clamp01(priority) + (1.0 - blend) * existing.priority);
    }

    for (key, value) in &candidate.metadata {
        existing.metadata.insert(key.clone(), value.clone());
    }

    if candidate.pinned {
        existing.pinned = true;
    }
    if candidate.cache_priority > existing.cache_priority {
        existing.cache_priority = candidate.cache_priority;
    }

    // a fresh mention hands control back to the scoring
    existing.score_override = None;
    existing.tier_override = None;
}

/// Focus tracking: topics, entities and events of the live conversation
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusPolicy;

impl PoolPolicy for FocusPolicy {
    fn name(&self) -> &'static str {
        "focus"
    }
}

/// Conversation cache: facts weighted by priority level and manual access
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub composite_weight: f64,
    pub priority_weight: f64,
    pub access_weight: f64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            composite_weight: 0.7,
            priority_weight: 0.2,
            access_weight: 0.1,
        }
    }
}

impl PoolPolicy for CachePolicy {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn on_insert(&self, item: &mut Item) {
        if item.cache_priority == CachePriority::Critical {
            item.pinned = true;
        }
    }

    fn merge(&self, existing: &mut Item, candidate: &CandidateItem, ctx: &MergeContext) {
        merge_sighting(existing, candidate, ctx);
        if existing.cache_priority == CachePriority::Critical {
            existing.pinned = true;
        }
    }

    fn eviction_weight(&self, item: &Item, max_mentions: u64) -> f64 {
        let access = repetition(item.access_count, max_mentions);
        clamp01(
            self.composite_weight * clamp01(item.scores.composite)
                + self.priority_weight * item.cache_priority.weight()
                + self.access_weight * access,
        )
    }
}
