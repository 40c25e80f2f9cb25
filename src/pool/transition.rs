//! Transition model
//!
//! Learns which items tend to follow which, online, from the order in which
//! items are mentioned. Feeds drift momentum into scoring and predicts
//! emerging items.

use super::item::{Item, ItemId};
use super::score::clamp01;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

/// In-degree at which the in-degree part of momentum saturates
const IN_DEGREE_CAP: usize = 3;

const MOMENTUM_MENTION_WEIGHT: f64 = 0.4;
const MOMENTUM_IN_DEGREE_WEIGHT: f64 = 0.3;
const MOMENTUM_POSITION_WEIGHT: f64 = 0.3;

/// Weighted transition graph plus a bounded buffer of recent ids
#[derive(Debug, Clone)]
pub struct TransitionModel {
    matrix: HashMap<ItemId, HashMap<ItemId, f64>>,
    sequence: VecDeque<ItemId>,
    sequence_capacity: usize,
    prediction_window: usize,
    momentum_window: Duration,
}

impl TransitionModel {
    pub fn new(sequence_capacity: usize, prediction_window: usize, momentum_window_secs: u64) -> Self {
        Self {
            matrix: HashMap::new(),
            sequence: VecDeque::with_capacity(sequence_capacity.max(1)),
            sequence_capacity: sequence_capacity.max(1),
            prediction_window: prediction_window.max(1),
            momentum_window: Duration::seconds(momentum_window_secs as i64),
        }
    }

    /// Append `to` to the recent sequence and, if `from` is given, add
    /// `strength` to the `from → to` edge. Self-transitions only touch the
    /// sequence.
    pub fn record_transition(&mut self, from: Option<ItemId>, to: ItemId, strength: f64) {
        self.sequence.push_back(to);
        while self.sequence.len() > self.sequence_capacity {
            self.sequence.pop_front();
        }

        if let Some(from) = from {
            if from != to {
                let strength = if strength.is_finite() { strength.max(0.0) } else { 0.0 };
                *self.matrix.entry(from).or_default().entry(to).or_insert(0.0) += strength;
            }
        }
    }

    /// Most recent entry of the sequence
    pub fn last(&self) -> Option<ItemId> {
        self.sequence.back().copied()
    }

    pub fn sequence(&self) -> impl Iterator<Item = &ItemId> {
        self.sequence.iter()
    }

    pub fn strength(&self, from: ItemId, to: ItemId) -> f64 {
        self.matrix
            .get(&from)
            .and_then(|targets| targets.get(&to))
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of distinct other items transitioning into `id`
    pub fn in_degree(&self, id: ItemId) -> usize {
        self.matrix
            .iter()
            .filter(|(from, targets)| **from != id && targets.get(&id).is_some_and(|s| *s > 0.0))
            .count()
    }

    /// How strongly an item is trending, in `[0, 1]`:
    /// `0.4·mention_recency + 0.3·in_degree + 0.3·sequence_position`.
    pub fn drift_momentum(&self, item: &Item, now: DateTime<Utc>) -> f64 {
        let recent_mentions = if item.mentions.is_empty() {
            0.0
        } else {
            let window_start = now - self.momentum_window;
            let recent = item
                .mentions
                .iter()
                .filter(|t| **t >= window_start && **t <= now)
                .count();
            clamp01(recent as f64 / item.mentions.len() as f64)
        };

        let in_degree = self.in_degree(item.id).min(IN_DEGREE_CAP) as f64 / IN_DEGREE_CAP as f64;

        let position = self
            .sequence
            .iter()
            .rposition(|id| *id == item.id)
            .map(|idx| (idx + 1) as f64 / self.sequence.len() as f64)
            .unwrap_or(0.0);

        clamp01(
            MOMENTUM_MENTION_WEIGHT * recent_mentions
                + MOMENTUM_IN_DEGREE_WEIGHT * in_degree
                + MOMENTUM_POSITION_WEIGHT * position,
        )
    }

    /// Predicted relevance for each candidate reachable from the tail of the
    /// recent sequence. Scores are normalized so the top prediction is 1.0;
    /// candidates that no recent entry transitions into are omitted.
    pub fn predict_emerging<'a, I>(&self, candidates: I) -> HashMap<ItemId, f64>
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let candidates: HashSet<ItemId> = candidates.into_iter().copied().collect();
        let mut accumulated: HashMap<ItemId, f64> = HashMap::new();

        for (distance, source) in self.sequence.iter().rev().take(self.prediction_window).enumerate() {
            let recency_weight = 1.0 / (distance as f64 + 1.0);
            let Some(targets) = self.matrix.get(source) else {
                continue;
            };
            for (target, strength) in targets {
                if *strength > 0.0 && candidates.contains(target) {
                    *accumulated.entry(*target).or_insert(0.0) += strength * recency_weight;
                }
            }
        }

        let max = accumulated.values().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return HashMap::new();
        }
        accumulated
            .into_iter()
            .map(|(id, score)| (id, clamp01(score / max)))
            .filter(|(_, score)| *score > 0.0)
            .collect()
    }

    /// Drop every trace of an item that left the pool.
    pub fn forget(&mut self, id: ItemId) {
        self.matrix.remove(&id);
        for targets in self.matrix.values_mut() {
            targets.remove(&id);
        }
        self.matrix.retain(|_, targets| !targets.is_empty());
        self.sequence.retain(|entry| *entry != id);
    }

    pub fn clear(&mut self) {
        self.matrix.clear();
        self.sequence.clear();
    }
}

impl Default for TransitionModel {
    fn default() -> Self {
        Self::new(20, 5, 300)
    }
}
