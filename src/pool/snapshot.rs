//! Read-side views of the pool
//!
//! `PoolView` is the immutable copy the service publishes after every
//! mutation; `Snapshot` is its JSON-shaped summary for diagnostics and UI.

use super::item::{Item, ItemId, ItemKind, Tier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Item the transition model expects to become relevant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergingItem {
    pub id: ItemId,
    pub label: String,
    pub kind: ItemKind,
    pub score: f64,
}

/// Consistent copy of the pool at one point in time
#[derive(Debug, Clone, Default)]
pub struct PoolView {
    /// Highest score first
    pub items: Vec<Item>,
    pub emerging: Vec<EmergingItem>,
    pub generated_at: DateTime<Utc>,
}

impl PoolView {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn top(&self, n: usize) -> Vec<Item> {
        self.items.iter().take(n).cloned().collect()
    }

    pub fn active(&self) -> Vec<Item> {
        self.in_tier(Tier::Active)
    }

    pub fn latent(&self) -> Vec<Item> {
        self.in_tier(Tier::Latent)
    }

    pub fn all(&self) -> Vec<Item> {
        self.items.clone()
    }

    fn in_tier(&self, tier: Tier) -> Vec<Item> {
        self.items.iter().filter(|item| item.tier == tier).cloned().collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_view(self)
    }
}

/// Compact per-item row of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub kind: ItemKind,
    pub label: String,
    pub score: f64,
    pub mention_count: u64,
    pub pinned: bool,
    pub last_updated: DateTime<Utc>,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            kind: item.kind.clone(),
            label: item.label.clone(),
            score: item.scores.composite,
            mention_count: item.mention_count,
            pinned: item.pinned,
            last_updated: item.last_updated,
        }
    }
}

/// Serializable summary of the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub active: Vec<ItemSummary>,
    pub latent: Vec<ItemSummary>,
    pub emerging: Vec<EmergingItem>,
    pub total_count: usize,
    pub type_distribution: BTreeMap<String, usize>,
    pub average_score: f64,
    pub generated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn from_view(view: &PoolView) -> Self {
        let mut type_distribution = BTreeMap::new();
        for item in &view.items {
            *type_distribution.entry(item.kind.to_string()).or_insert(0) += 1;
        }
        let average_score = if view.items.is_empty() {
            0.0
        } else {
            view.items.iter().map(|item| item.scores.composite).sum::<f64>() / view.items.len() as f64
        };

        Self {
            active: summaries(view, Tier::Active),
            latent: summaries(view, Tier::Latent),
            emerging: view.emerging.clone(),
            total_count: view.items.len(),
            type_distribution,
            average_score,
            generated_at: view.generated_at,
        }
    }

    /// Text block for injection into an LLM prompt. Empty when there is
    /// nothing in focus.
    pub fn to_prompt_string(&self) -> String {
        let mut parts = Vec::new();

        if !self.active.is_empty() {
            let lines: Vec<String> = self
                .active
                .iter()
                .map(|item| {
                    let marker = if item.pinned { "[!] " } else { "" };
                    format!("- {}{} ({})", marker, item.label, item.kind)
                })
                .collect();
            parts.push(format!("**Current Focus**:\n{}", lines.join("\n")));
        }

        if !self.latent.is_empty() {
            let labels: Vec<&str> = self.latent.iter().map(|item| item.label.as_str()).collect();
            parts.push(format!("**In the Background**: {}", labels.join(", ")));
        }

        // only confident predictions are worth the tokens
        let likely: Vec<&str> = self
            .emerging
            .iter()
            .filter(|e| e.score >= 0.5)
            .take(3)
            .map(|e| e.label.as_str())
            .collect();
        if !likely.is_empty() {
            parts.push(format!("**Likely Next**: {}", likely.join(", ")));
        }

        parts.join("\n\n")
    }
}

fn summaries(view: &PoolView, tier: Tier) -> Vec<ItemSummary> {
    view.items
        .iter()
        .filter(|item| item.tier == tier)
        .map(ItemSummary::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::item::CandidateItem;
    use crate::pool::ScoredPool;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = PoolView::default().snapshot();
        assert_eq!(snapshot.total_count, 0);
        assert_eq!(snapshot.average_score, 0.0);
        assert!(snapshot.to_prompt_string().is_empty());
    }

    #[test]
    fn test_snapshot_counts_and_serializes() {
        let now = Utc::now();
        let mut pool = ScoredPool::focus(PoolConfig::default());
        pool.ingest(
            vec![
                CandidateItem::new("topic", "travel"),
                CandidateItem::new("entity", "Alice"),
                CandidateItem::new("entity", "Bob"),
            ],
            now,
        );

        let snapshot = pool.view(now).snapshot();
        assert_eq!(snapshot.total_count, 3);
        assert_eq!(snapshot.type_distribution["entity"], 2);
        assert_eq!(snapshot.type_distribution["topic"], 1);
        assert_eq!(snapshot.active.len(), 3);
        assert!(snapshot.average_score > 0.0 && snapshot.average_score <= 1.0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["totalCount"], 3);
        assert!(json["typeDistribution"].is_object());

        let prompt = snapshot.to_prompt_string();
        assert!(prompt.contains("**Current Focus**"));
        assert!(prompt.contains("Alice"));
    }

    #[test]
    fn test_view_queries_follow_tiers() {
        let now = Utc::now();
        let mut pool = ScoredPool::focus(PoolConfig::default());
        for i in 0..14 {
            pool.ingest(vec![CandidateItem::new("topic", format!("t{}", i))], now);
        }
        let view = pool.view(now);
        assert_eq!(view.active().len(), 12);
        assert_eq!(view.latent().len(), 2);
        assert_eq!(view.top(3).len(), 3);
        assert_eq!(view.all().len(), 14);
        let first = view.items[0].id;
        assert!(view.get(first).is_some());
    }
}
