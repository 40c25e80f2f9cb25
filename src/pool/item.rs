//! Pool items and the candidates they are built from.

use super::similarity::LabelRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, VecDeque};
use uuid::Uuid;

/// Namespace for deterministic item ids.
const ITEM_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_93a4_2c57_4e0b_9a61_d4c8_02b7_e315);

/// Stable item identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Derive the id for `(kind, label)`. Labels are case-folded and trimmed,
    /// so the same name always maps to the same id.
    pub fn derive(kind: &ItemKind, label: &str) -> Self {
        let key = format!("{}:{}", kind, label.trim().to_lowercase());
        Self(Uuid::new_v5(&ITEM_ID_NAMESPACE, key.as_bytes()))
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of an item. Merges only happen within one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    Event,
    Topic,
    Entity,
    /// Free-form cache category
    Category(String),
}

impl From<String> for ItemKind {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "event" => Self::Event,
            "topic" => Self::Topic,
            "entity" | "person" | "place" => Self::Entity,
            other => Self::Category(other.to_string()),
        }
    }
}

impl From<&str> for ItemKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ItemKind> for String {
    fn from(kind: ItemKind) -> Self {
        kind.to_string()
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::Topic => write!(f, "topic"),
            Self::Entity => write!(f, "entity"),
            Self::Category(name) => write!(f, "{}", name),
        }
    }
}

/// Classification bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Active,
    Latent,
    Fading,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Latent => write!(f, "latent"),
            Self::Fading => write!(f, "fading"),
        }
    }
}

/// Priority levels for cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    /// Pinned on insert by the cache policy
    Critical,
}

impl CachePriority {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 0.0,
            Self::Normal => 0.35,
            Self::High => 0.7,
            Self::Critical => 1.0,
        }
    }
}

/// Derived scores, recomputed on every pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub recency: f64,
    pub repetition: f64,
    pub connectivity: f64,
    pub drift: f64,
    pub composite: f64,
}

/// Manually set composite score, held until the item is mentioned again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOverride {
    pub value: f64,
    pub reason: String,
    pub set_at: DateTime<Utc>,
}

/// A thing currently mattering in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub label: String,
    pub aliases: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Most recent mention timestamps, oldest first
    pub mentions: VecDeque<DateTime<Utc>>,
    pub mention_count: u64,
    /// Priority / emotional weight in `[0, 1]`
    pub priority: f64,
    pub linked: BTreeSet<ItemId>,
    pub scores: Scores,
    pub tier: Tier,
    pub pinned: bool,
    pub cache_priority: CachePriority,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_override: Option<ScoreOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_override: Option<Tier>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Item {
    /// Build a fresh item from its first sighting. The item starts in
    /// `Fading` until the first reclassification.
    pub fn from_candidate(candidate: &CandidateItem, now: DateTime<Utc>, mention_history: usize) -> Self {
        let label = candidate.label.trim().to_string();
        let aliases = candidate
            .aliases
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty() && *a != label)
            .collect();
        let mut mentions = VecDeque::with_capacity(mention_history.max(1));
        mentions.push_back(now);

        Self {
            id: ItemId::derive(&candidate.kind, &label),
            kind: candidate.kind.clone(),
            label,
            aliases,
            created_at: now,
            last_updated: now,
            mentions,
            mention_count: 1,
            priority: candidate.initial_priority(),
            linked: BTreeSet::new(),
            scores: Scores::default(),
            tier: Tier::Fading,
            pinned: candidate.pinned,
            cache_priority: candidate.cache_priority,
            access_count: 0,
            score_override: None,
            tier_override: None,
            metadata: candidate.metadata.clone(),
        }
    }

    pub fn label_ref(&self) -> LabelRef<'_> {
        LabelRef {
            kind: &self.kind,
            label: &self.label,
            aliases: &self.aliases,
        }
    }

    /// Record one more sighting, keeping at most `history` timestamps.
    pub fn record_mention(&mut self, at: DateTime<Utc>, history: usize) {
        self.mentions.push_back(at);
        while self.mentions.len() > history.max(1) {
            self.mentions.pop_front();
        }
        self.mention_count = self.mention_count.saturating_add(1);
        if at > self.last_updated {
            self.last_updated = at;
        }
    }

    /// Seconds since the last update; never negative.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> f64 {
        let ms = (now - self.last_updated).num_milliseconds();
        (ms.max(0) as f64) / 1000.0
    }
}

/// A candidate produced by extraction, before it is merged into the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Left unset, a merge keeps the item's priority and a new item starts
    /// at the default
    #[serde(default, alias = "priorityOrEmotion", alias = "emotion")]
    pub priority: Option<f64>,
    #[serde(default, alias = "linkedLabels", alias = "linked")]
    pub linked_labels: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub cache_priority: CachePriority,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

const DEFAULT_PRIORITY: f64 = 0.5;

impl CandidateItem {
    pub fn new(kind: impl Into<ItemKind>, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: label.into(),
            aliases: Vec::new(),
            priority: None,
            linked_labels: Vec::new(),
            pinned: false,
            cache_priority: CachePriority::Normal,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Priority for a new item, in [0, 1]
    pub fn initial_priority(&self) -> f64 {
        super::score::clamp01(self.priority.unwrap_or(DEFAULT_PRIORITY))
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_link(mut self, label: impl Into<String>) -> Self {
        self.linked_labels.push(label.into());
        self
    }

    pub fn with_cache_priority(mut self, priority: CachePriority) -> Self {
        self.cache_priority = priority;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Blank labels are ignored by the pool.
    pub fn is_valid(&self) -> bool {
        !self.label.trim().is_empty()
    }
}
