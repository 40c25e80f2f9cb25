//! Integration tests for the Salience pool and service

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use salience::config::{PoolConfig, ScoreWeights};
use salience::pool::score::{self, ScoreInputs};
use salience::pool::{EventKind, RemovalReason};
use salience::{CandidateExtractor, CandidateItem, ItemKind, PoolHandle, ResilientExtractor, ScoredPool, Tier, Turn};
use std::sync::Arc;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z").unwrap().with_timezone(&Utc)
}

/// Test that a single high-priority topic becomes active right away
#[test]
fn test_single_topic_becomes_active() {
    let mut pool = ScoredPool::focus(PoolConfig::default());
    pool.ingest(
        vec![CandidateItem::new(ItemKind::Topic, "Flutter性能优化").with_priority(0.8)],
        t0(),
    );

    let item = pool.find_by_label("flutter性能优化").unwrap();
    assert_eq!(item.tier, Tier::Active);
    assert!(item.scores.composite >= 0.15);
    assert!(item.scores.composite <= 1.0);
}

/// Test that a nickname sighting merges into the named entity
#[test]
fn test_alias_sighting_merges() {
    let mut pool = ScoredPool::focus(PoolConfig::default());
    pool.ingest(
        vec![CandidateItem::new(ItemKind::Entity, "张三").with_alias("小张")],
        t0(),
    );
    pool.ingest(
        vec![CandidateItem::new(ItemKind::Entity, "小张")],
        t0() + Duration::seconds(30),
    );

    assert_eq!(pool.len(), 1);
    let item = pool.find_by_label("小张").unwrap();
    assert_eq!(item.label, "张三");
    assert_eq!(item.mention_count, 2);
    assert_eq!(item.last_updated, t0() + Duration::seconds(30));
}

/// Test that fifteen equally fresh items split into twelve active and three latent
#[test]
fn test_fifteen_items_fill_tiers() {
    let mut pool = ScoredPool::focus(PoolConfig::default());
    let candidates = (0..15)
        .map(|i| CandidateItem::new(ItemKind::Topic, format!("subject {}", i)))
        .collect();
    pool.ingest(candidates, t0());

    assert_eq!(pool.active().len(), 12);
    assert_eq!(pool.latent().len(), 3);
    // every active item outranks every latent one
    let weakest_active = pool.active().iter().map(|i| i.scores.composite).fold(f64::MAX, f64::min);
    let strongest_latent = pool.latent().iter().map(|i| i.scores.composite).fold(0.0, f64::max);
    assert!(weakest_active >= strongest_latent);
}

/// Test that the cache evicts its oldest item when one over capacity and
/// never touches pinned items
#[test]
fn test_cache_evicts_oldest_past_capacity() {
    let config = PoolConfig::default().with_cache(200, 20);
    let mut pool = ScoredPool::cache(config);

    let pinned: Vec<CandidateItem> = (0..10)
        .map(|i| CandidateItem::new("profile", format!("profile fact {}", i)).pinned())
        .collect();
    pool.ingest(pinned, t0());

    let mut at = t0();
    for i in 0..185 {
        at += Duration::seconds(1);
        let events = pool.ingest(vec![CandidateItem::new("fact", format!("note {}", i))], at);
        assert!(events.iter().all(|e| !matches!(e.kind, EventKind::Removed { .. })));
    }

    let mut removed = Vec::new();
    for i in 185..201 {
        at += Duration::seconds(1);
        let events = pool.ingest(vec![CandidateItem::new("fact", format!("note {}", i))], at);
        removed.extend(
            events
                .into_iter()
                .filter(|e| e.kind == EventKind::Removed { reason: RemovalReason::Evicted }),
        );
    }

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].item.label, "note 0");
    assert_eq!(pool.len(), 210);
    assert_eq!(pool.all().iter().filter(|item| item.pinned).count(), 10);
}

/// Test that forgotten items are pruned once stale
#[test]
fn test_stale_items_pruned() {
    let config = PoolConfig::default().with_tiers(0, 12, 8).with_prune(900, 0.1);
    let mut pool = ScoredPool::focus(config);
    pool.ingest(vec![CandidateItem::new(ItemKind::Event, "dentist appointment")], t0());
    let id = pool.find_by_label("dentist appointment").unwrap().id;
    pool.set_item_score(id, 0.02, "dismissed", t0());
    assert_eq!(pool.get(id).unwrap().tier, Tier::Fading);

    let events = pool.tick(t0() + Duration::seconds(900));
    assert!(pool.is_empty());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Removed { reason: RemovalReason::Pruned });
}

/// Test that repeating the same turn merges instead of growing the pool
#[test]
fn test_repeated_turn_is_idempotent_in_size() {
    let mut pool = ScoredPool::focus(PoolConfig::default());
    let turn = || {
        vec![
            CandidateItem::new(ItemKind::Topic, "rust async"),
            CandidateItem::new(ItemKind::Entity, "Alice"),
        ]
    };
    pool.ingest(turn(), t0());
    pool.ingest(turn(), t0() + Duration::seconds(10));
    pool.ingest(turn(), t0() + Duration::seconds(20));

    assert_eq!(pool.len(), 2);
    assert!(pool.all().iter().all(|item| item.mention_count == 3));
}

/// Test that the composite score stays in [0, 1] for out-of-range inputs
#[test]
fn test_composite_bounded() {
    let weights = ScoreWeights::default();
    let extremes = [-5.0, 0.0, 0.5, 1.0, 7.0, f64::NAN];
    for &recency in &extremes {
        for &priority in &extremes {
            let inputs = ScoreInputs {
                recency,
                repetition: priority,
                priority,
                connectivity: recency,
                drift: 1.0,
            };
            let value = score::composite(&inputs, &weights);
            assert!((0.0..=1.0).contains(&value), "composite {} out of range", value);
        }
    }
}

/// Test that config loads from a TOML file and bad values are rejected
#[test]
fn test_config_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "similarity_threshold = 0.8\n\n[tiers]\nmax_active = 5\n\n[cache]\ncapacity = 50\nreserved_pinned_slots = 5\n",
    )
    .unwrap();

    let config = PoolConfig::load(&path).unwrap();
    assert_eq!(config.similarity_threshold, 0.8);
    assert_eq!(config.tiers.max_active, 5);
    assert_eq!(config.cache.map(|c| c.capacity), Some(50));

    std::fs::write(&path, "[decay]\ntau_secs = 0.0\n").unwrap();
    assert!(matches!(PoolConfig::load(&path), Err(salience::Error::Config(_))));
}

/// Extractor returning canned candidates for known turns and failing otherwise
struct Scripted;

#[async_trait]
impl CandidateExtractor for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract(&self, turn: &Turn) -> salience::Result<Vec<CandidateItem>> {
        match turn.text.as_str() {
            "planning the Tokyo trip" => Ok(vec![
                CandidateItem::new(ItemKind::Event, "Tokyo trip").with_priority(0.9),
                CandidateItem::new(ItemKind::Topic, "flights").with_link("Tokyo trip"),
            ]),
            "need to book flights" => Ok(vec![CandidateItem::new(ItemKind::Topic, "flights")]),
            _ => Err(salience::Error::Extraction("model unavailable".to_string())),
        }
    }
}

/// Test the service end to end: extraction, merge, events and fallback
#[tokio::test]
async fn test_service_end_to_end() {
    let extractor = ResilientExtractor::new(Arc::new(Scripted), std::time::Duration::from_secs(2));
    let handle = PoolHandle::spawn(ScoredPool::focus(PoolConfig::default()), Arc::new(extractor));
    let mut events = handle.subscribe();

    tokio_test::assert_ok!(handle.ingest_text(Turn::new("planning the Tokyo trip")).await);
    tokio_test::assert_ok!(handle.ingest_text(Turn::new("need to book flights")).await);
    // scripted extractor fails here, keyword fallback picks up the meeting
    tokio_test::assert_ok!(handle.ingest_text(Turn::new("also a meeting on Friday")).await);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.total_count, 4);
    let flights = handle
        .all()
        .into_iter()
        .find(|item| item.label == "flights")
        .unwrap();
    assert_eq!(flights.mention_count, 2);
    assert!(flights.scores.connectivity > 0.0);
    assert!(handle.all().iter().any(|item| item.label == "meeting"));

    let first = events.recv().await.unwrap();
    assert_eq!(first.kind, EventKind::Added);

    let prompt = snapshot.to_prompt_string();
    assert!(prompt.contains("Tokyo trip"));

    handle.shutdown().await.unwrap();
    assert!(handle.tick().await.is_err());
}
