//! Scored pool - the core orchestrator
//!
//! Owns the items and runs ingestion, merge, rescoring, tiering, pruning and
//! capacity-bounded eviction. Not internally synchronized: the service actor
//! is the single writer.

use super::events::{PoolEvent, RemovalReason};
use super::item::{CandidateItem, Item, ItemId, ItemKind, ScoreOverride, Tier};
use super::policy::{CachePolicy, FocusPolicy, MergeContext, PoolPolicy};
use super::score::{self, clamp01, ScoreInputs};
use super::similarity::{LabelRef, SimilarityMatcher};
use super::snapshot::{EmergingItem, PoolView};
use super::transition::TransitionModel;
use crate::config::PoolConfig;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

/// Bounded pool of scored items
pub struct ScoredPool<P: PoolPolicy = FocusPolicy> {
    config: PoolConfig,
    policy: P,
    matcher: SimilarityMatcher,
    transitions: TransitionModel,
    items: HashMap<ItemId, Item>,
}

impl ScoredPool<FocusPolicy> {
    /// Pool tracking the focus of a live conversation
    pub fn focus(config: PoolConfig) -> Self {
        Self::new(config, FocusPolicy)
    }
}

impl ScoredPool<CachePolicy> {
    /// Conversation cache; eviction applies when `config.cache` is set
    pub fn cache(config: PoolConfig) -> Self {
        Self::new(config, CachePolicy::default())
    }
}

impl<P: PoolPolicy> ScoredPool<P> {
    pub fn new(config: PoolConfig, policy: P) -> Self {
        let matcher = SimilarityMatcher::new(config.similarity_threshold);
        let transitions = TransitionModel::new(
            config.transitions.sequence_capacity,
            config.transitions.prediction_window,
            config.transitions.momentum_window_secs,
        );
        Self {
            config,
            policy,
            matcher,
            transitions,
            items: HashMap::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn transitions(&self) -> &TransitionModel {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Merge or insert every valid candidate, then run a full pass.
    pub fn ingest(&mut self, candidates: Vec<CandidateItem>, now: DateTime<Utc>) -> Vec<PoolEvent> {
        let mut added: HashSet<ItemId> = HashSet::new();
        let mut updated: HashSet<ItemId> = HashSet::new();
        let mut touched: Vec<(ItemId, CandidateItem)> = Vec::new();

        let ctx = MergeContext {
            now,
            priority_blend: self.config.priority_blend,
            mention_history: self.config.decay.mention_history,
        };
        let strength = self.config.transitions.transition_strength;

        for candidate in candidates.into_iter().filter(CandidateItem::is_valid) {
            let id = match self.find_similar(&candidate) {
                Some(id) => {
                    if let Some(existing) = self.items.get_mut(&id) {
                        self.policy.merge(existing, &candidate, &ctx);
                    }
                    if !added.contains(&id) {
                        updated.insert(id);
                    }
                    id
                }
                None => {
                    let mut item = Item::from_candidate(&candidate, now, self.config.decay.mention_history);
                    self.policy.on_insert(&mut item);
                    let id = item.id;
                    self.items.insert(id, item);
                    added.insert(id);
                    id
                }
            };

            let from = self.transitions.last();
            self.transitions.record_transition(from, id, strength);
            touched.push((id, candidate));
        }

        if touched.is_empty() {
            return Vec::new();
        }

        self.link_cooccurring(&touched);
        debug!(
            "Ingested {} candidates ({} new, {} merged)",
            touched.len(),
            added.len(),
            updated.len()
        );

        self.run_pass(now, &added, &updated)
    }

    /// Decay pass with no new input.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<PoolEvent> {
        self.run_pass(now, &HashSet::new(), &HashSet::new())
    }

    /// Recompute every derived score at `now`.
    pub fn rescore(&mut self, now: DateTime<Utc>) {
        let pool_size = self.items.len();
        let weights = self.config.weights;
        let decay = self.config.decay;

        let computed: Vec<(ItemId, ScoreInputs)> = self
            .items
            .values()
            .map(|item| {
                let degree = item.linked.iter().filter(|id| self.items.contains_key(id)).count();
                let inputs = ScoreInputs {
                    recency: score::recency_with(item.idle_secs(now), &decay),
                    repetition: score::repetition(item.mention_count, decay.max_mentions),
                    priority: item.priority,
                    connectivity: score::connectivity(degree, pool_size),
                    drift: self.transitions.drift_momentum(item, now),
                };
                (item.id, inputs)
            })
            .collect();

        for (id, inputs) in computed {
            if let Some(item) = self.items.get_mut(&id) {
                item.scores.recency = inputs.recency;
                item.scores.repetition = inputs.repetition;
                item.scores.connectivity = inputs.connectivity;
                item.scores.drift = inputs.drift;
                item.scores.composite = match &item.score_override {
                    Some(manual) => clamp01(manual.value),
                    None => score::composite(&inputs, &weights),
                };
            }
        }
    }

    /// Assign tiers from the current scores.
    ///
    /// Pinned items are always active and do not compete. The rest are ranked
    /// by composite score: the top `max_active` are active (or, with fewer
    /// competitors than slots, everyone above the active floor), the next
    /// `max_latent` above the latent floor are latent, the rest fade. If that
    /// leaves fewer than `min_active` active items, the best remaining items
    /// are promoted.
    pub fn reclassify(&mut self) {
        let tiers = self.config.tiers;
        let pinned: Vec<ItemId> = self.items.values().filter(|i| i.pinned).map(|i| i.id).collect();
        let active_slots = tiers.max_active.saturating_sub(pinned.len());
        let min_active = tiers.min_active.saturating_sub(pinned.len());

        let ranked = self.ranked_unpinned();
        let mut assigned: HashMap<ItemId, Tier> = HashMap::with_capacity(self.items.len());
        let mut active = 0usize;
        let mut latent = 0usize;

        // manual tier overrides claim their slots first
        for (id, _, forced) in &ranked {
            match forced {
                Some(Tier::Active) if active < active_slots => {
                    assigned.insert(*id, Tier::Active);
                    active += 1;
                }
                Some(Tier::Latent) if latent < tiers.max_latent => {
                    assigned.insert(*id, Tier::Latent);
                    latent += 1;
                }
                Some(Tier::Fading) => {
                    assigned.insert(*id, Tier::Fading);
                }
                _ => {}
            }
        }

        let competitors: Vec<(ItemId, f64)> = ranked
            .iter()
            .filter(|(id, _, _)| !assigned.contains_key(id))
            .map(|(id, score, _)| (*id, *score))
            .collect();
        let free_slots = active_slots.saturating_sub(active);
        let few_competitors = competitors.len() < free_slots;

        for (id, score) in &competitors {
            let tier = if active < active_slots && (!few_competitors || *score >= tiers.active_floor) {
                active += 1;
                Tier::Active
            } else if latent < tiers.max_latent && *score >= tiers.latent_floor {
                latent += 1;
                Tier::Latent
            } else {
                Tier::Fading
            };
            assigned.insert(*id, tier);
        }

        // promote until the active floor count is met: latent first, then
        // fading, manually faded items last
        if active < min_active {
            let mut promotable: Vec<(u8, ItemId)> = ranked
                .iter()
                .filter_map(|(id, _, forced)| match assigned.get(id) {
                    Some(Tier::Latent) => Some((0, *id)),
                    Some(Tier::Fading) if forced.is_none() => Some((1, *id)),
                    Some(Tier::Fading) => Some((2, *id)),
                    _ => None,
                })
                .collect();
            // ranked order is preserved within each group
            promotable.sort_by_key(|(group, _)| *group);
            for (_, id) in promotable {
                if active >= min_active {
                    break;
                }
                assigned.insert(id, Tier::Active);
                active += 1;
            }
        }

        for id in pinned {
            assigned.insert(id, Tier::Active);
        }
        for (id, tier) in assigned {
            if let Some(item) = self.items.get_mut(&id) {
                item.tier = tier;
            }
        }
    }

    /// Remove fading, non-pinned items idle for at least `staleness_window`
    /// and scoring below `min_score_floor`.
    pub fn prune(
        &mut self,
        now: DateTime<Utc>,
        staleness_window: Duration,
        min_score_floor: f64,
    ) -> Vec<PoolEvent> {
        let window_secs = staleness_window.as_secs_f64();
        let stale: Vec<ItemId> = self
            .items
            .values()
            .filter(|item| {
                !item.pinned
                    && item.tier == Tier::Fading
                    && item.idle_secs(now) >= window_secs
                    && item.scores.composite < min_score_floor
            })
            .map(|item| item.id)
            .collect();

        if !stale.is_empty() {
            info!("Pruning {} stale items", stale.len());
        }
        stale
            .into_iter()
            .filter_map(|id| self.remove(id, RemovalReason::Pruned))
            .collect()
    }

    /// Evict lowest-weight non-pinned items until the non-pinned count fits.
    ///
    /// The non-pinned bound is `capacity`, reduced by however many pinned
    /// items overflow their `reserved_pinned_slots`.
    pub fn evict_if_over_capacity(&mut self, capacity: usize, reserved_pinned_slots: usize) -> Vec<PoolEvent> {
        let pinned = self.items.values().filter(|i| i.pinned).count();
        let bound = capacity.saturating_sub(pinned.saturating_sub(reserved_pinned_slots));
        let unpinned = self.items.len() - pinned;
        if unpinned <= bound {
            return Vec::new();
        }

        let max_mentions = self.config.decay.max_mentions;
        let mut candidates: Vec<(ItemId, f64, DateTime<Utc>)> = self
            .items
            .values()
            .filter(|item| !item.pinned)
            .map(|item| (item.id, self.policy.eviction_weight(item, max_mentions), item.last_updated))
            .collect();
        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        let excess = unpinned - bound;
        info!(
            "Pool over capacity ({} unpinned, bound {}), evicting {} via {} policy",
            unpinned,
            bound,
            excess,
            self.policy.name()
        );
        candidates
            .into_iter()
            .take(excess)
            .filter_map(|(id, _, _)| self.remove(id, RemovalReason::Evicted))
            .collect()
    }

    // ── Manual overrides ─────────────────────────────────────────

    /// Force an item's composite score until its next mention.
    pub fn set_item_score(&mut self, id: ItemId, value: f64, reason: &str, now: DateTime<Utc>) -> Vec<PoolEvent> {
        let Some(item) = self.items.get_mut(&id) else {
            return Vec::new();
        };
        let value = clamp01(value);
        item.score_override = Some(ScoreOverride {
            value,
            reason: reason.to_string(),
            set_at: now,
        });
        item.scores.composite = value;
        debug!("Score of '{}' set to {:.2}: {}", item.label, value, reason);
        self.reclassify_with_events(&HashSet::from([id]))
    }

    /// Force an item into a tier until its next mention. Ignored for pinned
    /// items, which are always active.
    pub fn set_item_tier(&mut self, id: ItemId, tier: Tier) -> Vec<PoolEvent> {
        let Some(item) = self.items.get_mut(&id) else {
            return Vec::new();
        };
        if item.pinned {
            return Vec::new();
        }
        item.tier_override = Some(tier);
        self.reclassify_with_events(&HashSet::new())
    }

    /// Add a manually curated topic with the given importance.
    pub fn add_manual(&mut self, label: &str, importance: f64, now: DateTime<Utc>) -> Vec<PoolEvent> {
        let candidate = CandidateItem::new(ItemKind::Topic, label)
            .with_priority(importance)
            .with_metadata("source", serde_json::Value::String("manual".to_string()));
        self.ingest(vec![candidate], now)
    }

    pub fn pin(&mut self, id: ItemId) -> Vec<PoolEvent> {
        self.set_pinned(id, true)
    }

    pub fn unpin(&mut self, id: ItemId) -> Vec<PoolEvent> {
        self.set_pinned(id, false)
    }

    fn set_pinned(&mut self, id: ItemId, pinned: bool) -> Vec<PoolEvent> {
        match self.items.get_mut(&id) {
            Some(item) if item.pinned != pinned => item.pinned = pinned,
            _ => return Vec::new(),
        }
        self.reclassify_with_events(&HashSet::from([id]))
    }

    /// Count a manual access (cache weight input). Does not refresh recency.
    pub fn touch(&mut self, id: ItemId) -> Option<u64> {
        let item = self.items.get_mut(&id)?;
        item.access_count = item.access_count.saturating_add(1);
        Some(item.access_count)
    }

    /// Drop everything, including the transition history.
    pub fn clear_all(&mut self) -> Vec<PoolEvent> {
        self.transitions.clear();
        let events: Vec<PoolEvent> = self
            .items
            .drain()
            .map(|(_, item)| PoolEvent::removed(item, RemovalReason::Cleared))
            .collect();
        if !events.is_empty() {
            info!("Cleared {} items from pool", events.len());
        }
        events
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// Find an item by label or alias, case-insensitively, across kinds.
    pub fn find_by_label(&self, label: &str) -> Option<&Item> {
        let wanted = label.trim().to_lowercase();
        self.items.values().find(|item| {
            item.label.to_lowercase() == wanted || item.aliases.iter().any(|a| a.to_lowercase() == wanted)
        })
    }

    /// All items, highest score first
    pub fn all(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.values().collect();
        items.sort_by(|a, b| by_score_desc(a, b));
        items
    }

    pub fn top(&self, n: usize) -> Vec<&Item> {
        let mut items = self.all();
        items.truncate(n);
        items
    }

    pub fn active(&self) -> Vec<&Item> {
        self.in_tier(Tier::Active)
    }

    pub fn latent(&self) -> Vec<&Item> {
        self.in_tier(Tier::Latent)
    }

    pub fn fading(&self) -> Vec<&Item> {
        self.in_tier(Tier::Fading)
    }

    fn in_tier(&self, tier: Tier) -> Vec<&Item> {
        self.all().into_iter().filter(|item| item.tier == tier).collect()
    }

    /// Non-active items the transition model expects to come up next
    pub fn emerging(&self, n: usize) -> Vec<EmergingItem> {
        let candidates: Vec<ItemId> = self
            .items
            .values()
            .filter(|item| item.tier != Tier::Active)
            .map(|item| item.id)
            .collect();
        let mut predicted: Vec<EmergingItem> = self
            .transitions
            .predict_emerging(candidates.iter())
            .into_iter()
            .filter_map(|(id, score)| {
                self.items.get(&id).map(|item| EmergingItem {
                    id,
                    label: item.label.clone(),
                    kind: item.kind.clone(),
                    score,
                })
            })
            .collect();
        predicted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.label.cmp(&b.label))
        });
        predicted.truncate(n);
        predicted
    }

    /// Owned, immutable copy of the current state for readers
    pub fn view(&self, now: DateTime<Utc>) -> PoolView {
        PoolView {
            items: self.all().into_iter().cloned().collect(),
            emerging: self.emerging(self.config.tiers.max_latent),
            generated_at: now,
        }
    }

    // ── Internals ────────────────────────────────────────────────

    /// Rescore, evict (when bounded), reclassify, prune; then describe what
    /// changed.
    fn run_pass(
        &mut self,
        now: DateTime<Utc>,
        added: &HashSet<ItemId>,
        updated: &HashSet<ItemId>,
    ) -> Vec<PoolEvent> {
        let before = self.tiers_excluding(added);
        let mut events = Vec::new();

        self.rescore(now);
        if let Some(cache) = self.config.cache {
            events.extend(self.evict_if_over_capacity(cache.capacity, cache.reserved_pinned_slots));
        }
        self.reclassify();
        let prune = self.config.prune;
        events.extend(self.prune(now, prune.staleness_window(), prune.min_score_floor));

        // items created and removed in the same pass were never announced
        events.retain(|event| !added.contains(&event.item.id));

        events.extend(self.change_events(&before, added, updated));
        debug!(
            "Pool pass: {} items, {} active, {} latent, {} events",
            self.items.len(),
            self.items.values().filter(|i| i.tier == Tier::Active).count(),
            self.items.values().filter(|i| i.tier == Tier::Latent).count(),
            events.len()
        );
        events
    }

    fn reclassify_with_events(&mut self, updated: &HashSet<ItemId>) -> Vec<PoolEvent> {
        let before = self.tiers_excluding(&HashSet::new());
        self.reclassify();
        self.change_events(&before, &HashSet::new(), updated)
    }

    fn tiers_excluding(&self, skip: &HashSet<ItemId>) -> HashMap<ItemId, Tier> {
        self.items
            .values()
            .filter(|item| !skip.contains(&item.id))
            .map(|item| (item.id, item.tier))
            .collect()
    }

    fn change_events(
        &self,
        before: &HashMap<ItemId, Tier>,
        added: &HashSet<ItemId>,
        updated: &HashSet<ItemId>,
    ) -> Vec<PoolEvent> {
        let mut events = Vec::new();
        for item in self.all() {
            if added.contains(&item.id) {
                events.push(PoolEvent::added(item));
                continue;
            }
            if updated.contains(&item.id) {
                events.push(PoolEvent::updated(item));
            }
            if let Some(previous) = before.get(&item.id) {
                if *previous != item.tier {
                    events.push(PoolEvent::tier_changed(item, *previous));
                }
            }
        }
        events
    }

    /// Best same-kind match at or above the similarity threshold.
    fn find_similar(&self, candidate: &CandidateItem) -> Option<ItemId> {
        let aliases: BTreeSet<String> = candidate.aliases.iter().map(|a| a.trim().to_string()).collect();
        let query = LabelRef {
            kind: &candidate.kind,
            label: candidate.label.trim(),
            aliases: &aliases,
        };

        self.items
            .values()
            .filter(|item| item.kind == candidate.kind)
            .map(|item| (item.id, self.matcher.similarity(item.label_ref(), query)))
            .filter(|(_, similarity)| *similarity >= self.matcher.threshold())
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then_with(|| b.0.cmp(&a.0)))
            .map(|(id, _)| id)
    }

    /// Link items seen in the same ingest to each other and to any pool item
    /// named in their linked labels.
    fn link_cooccurring(&mut self, touched: &[(ItemId, CandidateItem)]) {
        let ids: BTreeSet<ItemId> = touched.iter().map(|(id, _)| *id).collect();
        let mut links: Vec<(ItemId, ItemId)> = Vec::new();

        for a in &ids {
            for b in &ids {
                if a != b {
                    links.push((*a, *b));
                }
            }
        }
        for (id, candidate) in touched {
            for label in &candidate.linked_labels {
                if let Some(target) = self.find_by_label(label).map(|item| item.id) {
                    if target != *id {
                        links.push((*id, target));
                        links.push((target, *id));
                    }
                }
            }
        }

        for (from, to) in links {
            if let Some(item) = self.items.get_mut(&from) {
                item.linked.insert(to);
            }
        }
    }

    /// Non-pinned items, best first, with any manual tier override.
    fn ranked_unpinned(&self) -> Vec<(ItemId, f64, Option<Tier>)> {
        self.all()
            .into_iter()
            .filter(|item| !item.pinned)
            .map(|item| (item.id, item.scores.composite, item.tier_override))
            .collect()
    }

    fn remove(&mut self, id: ItemId, reason: RemovalReason) -> Option<PoolEvent> {
        let item = self.items.remove(&id)?;
        self.transitions.forget(id);
        for other in self.items.values_mut() {
            other.linked.remove(&id);
        }
        debug!("Removed '{}' ({:?})", item.label, reason);
        Some(PoolEvent::removed(item, reason))
    }
}

/// Score descending; ties go to the most recently updated, then by label.
fn by_score_desc(a: &Item, b: &Item) -> Ordering {
    b.scores
        .composite
        .partial_cmp(&a.scores.composite)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.last_updated.cmp(&a.last_updated))
        .then_with(|| a.label.cmp(&b.label))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::events::EventKind;
    use chrono::Duration as ChronoDuration;

    fn topic(label: &str) -> CandidateItem {
        CandidateItem::new(ItemKind::Topic, label)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_first_item_scores_and_activates() {
        let mut pool = ScoredPool::focus(PoolConfig::default());
        let events = pool.ingest(vec![topic("Flutter性能优化").with_priority(0.8)], t0());

        let item = pool.find_by_label("Flutter性能优化").unwrap();
        assert_eq!(item.scores.recency, 1.0);
        assert!(item.scores.composite >= 0.15);
        assert_eq!(item.tier, Tier::Active);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Added);
        assert_eq!(events[0].item.tier, Tier::Active);
    }

    #[test]
    fn test_duplicate_merge_is_idempotent() {
        let mut pool = ScoredPool::focus(PoolConfig::default());
        pool.ingest(vec![topic("rust async")], t0());
        let id = pool.find_by_label("rust async").unwrap().id;

        let events = pool.ingest(vec![topic("rust async")], t0() + ChronoDuration::seconds(5));
        assert_eq!(pool.len(), 1);
        let item = pool.get(id).unwrap();
        assert_eq!(item.mention_count, 2);
        assert!(events.iter().any(|e| e.kind == EventKind::Updated));
    }

    #[test]
    fn test_same_label_different_kind_not_merged() {
        let mut pool = ScoredPool::focus(PoolConfig::default());
        pool.ingest(
            vec![topic("Paris"), CandidateItem::new(ItemKind::Entity, "Paris")],
            t0(),
        );
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_tier_caps_with_fifteen_items() {
        let mut pool = ScoredPool::focus(PoolConfig::default());
        for i in 0..15 {
            pool.ingest(vec![topic(&format!("subject{}", i))], t0() + ChronoDuration::seconds(i));
        }
        assert_eq!(pool.active().len(), 12);
        assert_eq!(pool.latent().len(), 3);
        assert!(pool.fading().is_empty());
    }

    #[test]
    fn test_min_active_promotes_low_scorers() {
        let config = PoolConfig::default().with_tiers(3, 12, 8);
        let mut pool = ScoredPool::focus(config);
        pool.ingest(vec![topic("a"), topic("b"), topic("c")], t0());
        for item in pool.all().into_iter().map(|i| i.id).collect::<Vec<_>>() {
            pool.set_item_score(item, 0.05, "test", t0());
        }
        assert_eq!(pool.active().len(), 3);
    }

    #[test]
    fn test_pinned_always_active_and_never_evicted() {
        let config = PoolConfig::default().with_tiers(0, 12, 8);
        let mut pool = ScoredPool::focus(config);
        pool.ingest(vec![topic("profile").pinned(), topic("chatter")], t0());
        let profile = pool.find_by_label("profile").unwrap().id;

        pool.set_item_score(profile, 0.0, "test", t0());
        pool.set_item_tier(profile, Tier::Fading);
        assert_eq!(pool.get(profile).unwrap().tier, Tier::Active);

        let events = pool.evict_if_over_capacity(0, 0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item.label, "chatter");
        assert!(pool.get(profile).is_some());
    }

    #[test]
    fn test_set_item_tier_override_until_next_mention() {
        let mut pool = ScoredPool::focus(PoolConfig::default().with_tiers(0, 12, 8));
        pool.ingest(vec![topic("weather")], t0());
        let id = pool.find_by_label("weather").unwrap().id;

        let events = pool.set_item_tier(id, Tier::Latent);
        assert_eq!(pool.get(id).unwrap().tier, Tier::Latent);
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::TierChanged { to: Tier::Latent, .. })));

        pool.tick(t0() + ChronoDuration::seconds(1));
        assert_eq!(pool.get(id).unwrap().tier, Tier::Latent);

        pool.ingest(vec![topic("weather")], t0() + ChronoDuration::seconds(2));
        assert_eq!(pool.get(id).unwrap().tier, Tier::Active);
    }

    #[test]
    fn test_prune_removes_stale_low_fading_items() {
        let config = PoolConfig::default().with_tiers(0, 12, 8).with_prune(600, 0.1);
        let mut pool = ScoredPool::focus(config);
        pool.ingest(vec![topic("old news")], t0());
        let id = pool.find_by_label("old news").unwrap().id;
        pool.set_item_score(id, 0.05, "stale", t0());

        // not stale yet
        assert!(pool.tick(t0() + ChronoDuration::seconds(300)).iter().all(|e| e.item.id != id));
        assert!(pool.get(id).is_some());

        let events = pool.tick(t0() + ChronoDuration::seconds(900));
        assert!(pool.get(id).is_none());
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Removed { reason: RemovalReason::Pruned }));
    }

    #[test]
    fn test_linked_labels_raise_connectivity() {
        let mut pool = ScoredPool::focus(PoolConfig::default());
        pool.ingest(vec![topic("rust")], t0());
        pool.ingest(vec![topic("tokio").with_link("rust")], t0() + ChronoDuration::seconds(1));

        let rust = pool.find_by_label("rust").unwrap();
        let tokio = pool.find_by_label("tokio").unwrap();
        assert!(rust.linked.contains(&tokio.id));
        assert!(tokio.scores.connectivity > 0.0);
    }

    #[test]
    fn test_empty_ingest_is_noop() {
        let mut pool = ScoredPool::focus(PoolConfig::default());
        assert!(pool.ingest(Vec::new(), t0()).is_empty());
        assert!(pool.ingest(vec![topic("   ")], t0()).is_empty());
        assert!(pool.tick(t0()).is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_emerging_predicts_follow_up() {
        let config = PoolConfig::default().with_tiers(0, 1, 8);
        let mut pool = ScoredPool::focus(config);
        let mut at = t0();
        // coffee is always followed by deadline
        for _ in 0..3 {
            pool.ingest(vec![topic("coffee")], at);
            at += ChronoDuration::seconds(10);
            pool.ingest(vec![topic("deadline")], at);
            at += ChronoDuration::seconds(10);
        }
        pool.ingest(vec![topic("weekend plans").with_priority(1.0)], at);
        at += ChronoDuration::seconds(10);
        pool.ingest(vec![topic("coffee")], at);

        let emerging = pool.emerging(5);
        assert!(!emerging.is_empty());
        assert_eq!(emerging[0].label, "deadline");
        assert_eq!(emerging[0].score, 1.0);
    }

    #[test]
    fn test_clear_all_emits_removals() {
        let mut pool = ScoredPool::focus(PoolConfig::default());
        pool.ingest(vec![topic("a"), topic("b")], t0());
        let events = pool.clear_all();
        assert_eq!(events.len(), 2);
        assert!(pool.is_empty());
        assert!(pool.transitions().last().is_none());
    }

    #[test]
    fn test_touch_counts_access() {
        let mut pool = ScoredPool::cache(PoolConfig::default());
        pool.ingest(vec![CandidateItem::new("fact", "likes tea")], t0());
        let id = pool.find_by_label("likes tea").unwrap().id;
        assert_eq!(pool.touch(id), Some(1));
        assert_eq!(pool.touch(id), Some(2));
    }
}
