//! Pool module for Salience
//!
//! Scoring math, label matching, the transition model and the scored pool
//! that ties them together.

mod events;
mod item;
mod manager;
mod policy;
pub mod score;
mod similarity;
mod snapshot;
mod transition;

pub use events::{ChangeNotifier, EventKind, PoolEvent, RemovalReason};
pub use item::{CachePriority, CandidateItem, Item, ItemId, ItemKind, ScoreOverride, Scores, Tier};
pub use manager::ScoredPool;
pub use policy::{merge_sighting, CachePolicy, FocusPolicy, MergeContext, PoolPolicy};
pub use similarity::{jaccard, tokens, LabelRef, SimilarityMatcher};
pub use snapshot::{EmergingItem, ItemSummary, PoolView, Snapshot};
pub use transition::TransitionModel;
