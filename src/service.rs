//! Pool service
//!
//! One actor task owns the pool and is its only writer. Handles send it
//! commands over an mpsc queue; the actor also runs the periodic decay tick.
//! After every command it publishes an immutable `PoolView` through a watch
//! channel, so queries never wait on the writer and always see a state some
//! command left behind.
//!
//! Extraction happens on the caller's task before the ingest command is
//! queued, so a slow model call never blocks other writers. An extractor
//! error never reaches the caller: the turn is re-extracted with keywords.

use crate::extract::{CandidateExtractor, KeywordExtractor, Turn};
use crate::pool::{
    CandidateItem, ChangeNotifier, EmergingItem, Item, ItemId, PoolEvent, PoolPolicy, PoolView, ScoredPool,
    Snapshot, Tier,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::Stream;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Ingest {
        candidates: Vec<CandidateItem>,
        at: DateTime<Utc>,
        reply: Reply<Vec<PoolEvent>>,
    },
    Tick {
        reply: Reply<Vec<PoolEvent>>,
    },
    SetScore {
        id: ItemId,
        value: f64,
        reason: String,
        reply: Reply<Vec<PoolEvent>>,
    },
    SetTier {
        id: ItemId,
        tier: Tier,
        reply: Reply<Vec<PoolEvent>>,
    },
    AddManual {
        label: String,
        importance: f64,
        reply: Reply<Vec<PoolEvent>>,
    },
    Pin {
        id: ItemId,
        reply: Reply<Vec<PoolEvent>>,
    },
    Unpin {
        id: ItemId,
        reply: Reply<Vec<PoolEvent>>,
    },
    Touch {
        id: ItemId,
        reply: Reply<Option<u64>>,
    },
    Clear {
        reply: Reply<Vec<PoolEvent>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

struct PoolActor<P: PoolPolicy> {
    pool: ScoredPool<P>,
    commands: mpsc::Receiver<Command>,
    view_tx: watch::Sender<Arc<PoolView>>,
    notifier: ChangeNotifier,
}

impl<P: PoolPolicy> PoolActor<P> {
    async fn run(mut self) {
        let period = self.pool.config().tick_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Pool service started ({} policy, tick every {:?})",
            self.pool.policy().name(),
            period
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    // every handle is gone
                    None => break,
                },
                _ = ticker.tick() => {
                    let events = self.pool.tick(Utc::now());
                    debug!("Periodic tick produced {} events", events.len());
                    self.publish(events);
                }
            }
        }

        info!("Pool service stopped with {} items", self.pool.len());
    }

    fn handle(&mut self, command: Command) {
        let now = Utc::now();
        match command {
            Command::Ingest { candidates, at, reply } => {
                let events = self.pool.ingest(candidates, at);
                self.respond(events, reply);
            }
            Command::Tick { reply } => {
                let events = self.pool.tick(now);
                self.respond(events, reply);
            }
            Command::SetScore { id, value, reason, reply } => {
                let events = self.pool.set_item_score(id, value, &reason, now);
                self.respond(events, reply);
            }
            Command::SetTier { id, tier, reply } => {
                let events = self.pool.set_item_tier(id, tier);
                self.respond(events, reply);
            }
            Command::AddManual { label, importance, reply } => {
                let events = self.pool.add_manual(&label, importance, now);
                self.respond(events, reply);
            }
            Command::Pin { id, reply } => {
                let events = self.pool.pin(id);
                self.respond(events, reply);
            }
            Command::Unpin { id, reply } => {
                let events = self.pool.unpin(id);
                self.respond(events, reply);
            }
            Command::Touch { id, reply } => {
                let count = self.pool.touch(id);
                self.publish(Vec::new());
                let _ = reply.send(count);
            }
            Command::Clear { reply } => {
                let events = self.pool.clear_all();
                self.respond(events, reply);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Publish the new view and events, then answer the caller.
    fn respond(&self, events: Vec<PoolEvent>, reply: Reply<Vec<PoolEvent>>) {
        self.publish(events.clone());
        // the caller may have stopped waiting
        let _ = reply.send(events);
    }

    fn publish(&self, events: Vec<PoolEvent>) {
        self.view_tx.send_replace(Arc::new(self.pool.view(Utc::now())));
        self.notifier.publish(events);
    }
}

/// Cloneable handle to a running pool service
#[derive(Clone)]
pub struct PoolHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<Arc<PoolView>>,
    notifier: ChangeNotifier,
    extractor: Arc<dyn CandidateExtractor>,
    fallback: Arc<KeywordExtractor>,
}

impl PoolHandle {
    /// Start the actor for `pool` on the current runtime.
    ///
    /// The service stops on `shutdown` or once every handle is dropped.
    pub fn spawn<P: PoolPolicy>(pool: ScoredPool<P>, extractor: Arc<dyn CandidateExtractor>) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view) = watch::channel(Arc::new(pool.view(Utc::now())));
        let notifier = ChangeNotifier::new(EVENT_BUFFER);

        let actor = PoolActor {
            pool,
            commands: rx,
            view_tx,
            notifier: notifier.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            commands,
            view,
            notifier,
            extractor,
            fallback: Arc::new(KeywordExtractor::new()),
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ServiceClosed)?;
        rx.await.map_err(|_| Error::ServiceClosed)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Extract candidates from a turn and ingest them at the turn's time.
    ///
    /// Falls back to keyword extraction when the extractor fails, so the only
    /// error left is `Error::ServiceClosed`.
    pub async fn ingest_text(&self, turn: Turn) -> Result<Vec<PoolEvent>> {
        let candidates = match self.extractor.extract(&turn).await {
            Ok(candidates) => {
                debug!(
                    "{} extractor produced {} candidates",
                    self.extractor.name(),
                    candidates.len()
                );
                candidates
            }
            Err(e) => {
                warn!("{} extraction failed, using keyword fallback: {}", self.extractor.name(), e);
                self.fallback.extract_sync(&turn)
            }
        };
        self.ingest(candidates, turn.timestamp).await
    }

    pub async fn ingest(&self, candidates: Vec<CandidateItem>, at: DateTime<Utc>) -> Result<Vec<PoolEvent>> {
        self.request(|reply| Command::Ingest { candidates, at, reply }).await
    }

    /// Run a decay pass now instead of waiting for the next periodic tick.
    pub async fn tick(&self) -> Result<Vec<PoolEvent>> {
        self.request(|reply| Command::Tick { reply }).await
    }

    pub async fn set_item_score(&self, id: ItemId, value: f64, reason: impl Into<String>) -> Result<Vec<PoolEvent>> {
        let reason = reason.into();
        self.request(|reply| Command::SetScore { id, value, reason, reply }).await
    }

    pub async fn set_item_tier(&self, id: ItemId, tier: Tier) -> Result<Vec<PoolEvent>> {
        self.request(|reply| Command::SetTier { id, tier, reply }).await
    }

    pub async fn add_manual(&self, label: impl Into<String>, importance: f64) -> Result<Vec<PoolEvent>> {
        let label = label.into();
        self.request(|reply| Command::AddManual { label, importance, reply }).await
    }

    pub async fn pin(&self, id: ItemId) -> Result<Vec<PoolEvent>> {
        self.request(|reply| Command::Pin { id, reply }).await
    }

    pub async fn unpin(&self, id: ItemId) -> Result<Vec<PoolEvent>> {
        self.request(|reply| Command::Unpin { id, reply }).await
    }

    /// Count an access. `None` when the item is unknown.
    pub async fn touch(&self, id: ItemId) -> Result<Option<u64>> {
        self.request(|reply| Command::Touch { id, reply }).await
    }

    pub async fn clear_all(&self) -> Result<Vec<PoolEvent>> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Stop the actor. Later requests from any handle fail with
    /// `Error::ServiceClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Latest published view
    pub fn view(&self) -> Arc<PoolView> {
        self.view.borrow().clone()
    }

    /// Receiver notified whenever a new view is published
    pub fn watch(&self) -> watch::Receiver<Arc<PoolView>> {
        self.view.clone()
    }

    pub fn get(&self, id: ItemId) -> Option<Item> {
        self.view().get(id).cloned()
    }

    pub fn top(&self, n: usize) -> Vec<Item> {
        self.view().top(n)
    }

    pub fn active(&self) -> Vec<Item> {
        self.view().active()
    }

    pub fn latent(&self) -> Vec<Item> {
        self.view().latent()
    }

    pub fn all(&self) -> Vec<Item> {
        self.view().all()
    }

    pub fn emerging(&self, n: usize) -> Vec<EmergingItem> {
        self.view().emerging.iter().take(n).cloned().collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.view().snapshot()
    }

    // ── Events ───────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.notifier.subscribe()
    }

    pub fn events(&self) -> impl Stream<Item = PoolEvent> + Send + 'static {
        self.notifier.stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::extract::KeywordExtractor;
    use crate::pool::{EventKind, ItemKind, RemovalReason};
    use futures::StreamExt;
    use std::time::Duration;

    fn spawn_focus(config: PoolConfig) -> PoolHandle {
        PoolHandle::spawn(ScoredPool::focus(config), Arc::new(KeywordExtractor::new()))
    }

    #[tokio::test]
    async fn test_ingest_then_read_view() {
        let handle = spawn_focus(PoolConfig::default());
        handle
            .ingest(
                vec![
                    CandidateItem::new(ItemKind::Topic, "travel"),
                    CandidateItem::new(ItemKind::Entity, "Alice"),
                    CandidateItem::new(ItemKind::Event, "flight"),
                ],
                Utc::now(),
            )
            .await
            .unwrap();

        // the view is published before the reply
        assert_eq!(handle.all().len(), 3);
        assert_eq!(handle.top(2).len(), 2);
        assert_eq!(handle.snapshot().total_count, 3);
    }

    #[tokio::test]
    async fn test_ingest_text_uses_extractor() {
        let handle = spawn_focus(PoolConfig::default());
        handle
            .ingest_text(Turn::new("Lunch with Sarah Connor before the meeting"))
            .await
            .unwrap();

        let labels: Vec<String> = handle.all().into_iter().map(|item| item.label).collect();
        assert!(labels.contains(&"Sarah Connor".to_string()));
        assert!(labels.contains(&"meeting".to_string()));
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let handle = spawn_focus(PoolConfig::default());
        let mut rx = handle.subscribe();

        handle
            .ingest(vec![CandidateItem::new(ItemKind::Topic, "rust")], Utc::now())
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Added);
        assert_eq!(event.item.label, "rust");
    }

    #[tokio::test]
    async fn test_event_stream_follows_writes() {
        let handle = spawn_focus(PoolConfig::default());
        let mut events = Box::pin(handle.events());

        handle.add_manual("temp", 0.5).await.unwrap();
        handle.clear_all().await.unwrap();

        assert_eq!(events.next().await.unwrap().kind, EventKind::Added);
        assert_eq!(
            events.next().await.unwrap().kind,
            EventKind::Removed { reason: RemovalReason::Cleared }
        );
    }

    #[tokio::test]
    async fn test_overrides_round_trip_through_actor() {
        let handle = spawn_focus(PoolConfig::default());
        handle.add_manual("quarterly review", 0.9).await.unwrap();
        let id = handle.all()[0].id;

        handle.set_item_score(id, 0.05, "user dismissed").await.unwrap();
        assert_eq!(handle.get(id).unwrap().scores.composite, 0.05);

        handle.pin(id).await.unwrap();
        let item = handle.get(id).unwrap();
        assert!(item.pinned);
        assert_eq!(item.tier, Tier::Active);

        assert_eq!(handle.touch(id).await.unwrap(), Some(1));
        assert_eq!(handle.touch(ItemId::derive(&ItemKind::Topic, "missing")).await.unwrap(), None);

        let removed = handle.clear_all().await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(handle.view().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_serialize() {
        let handle = spawn_focus(PoolConfig::default());
        let mut tasks = Vec::new();
        for i in 0..10 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .ingest(vec![CandidateItem::new(ItemKind::Topic, format!("topic {}", i))], Utc::now())
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(handle.all().len(), 10);
    }

    #[tokio::test]
    async fn test_requests_fail_after_shutdown() {
        let handle = spawn_focus(PoolConfig::default());
        let other = handle.clone();
        handle.shutdown().await.unwrap();

        let result = other.ingest(vec![CandidateItem::new(ItemKind::Topic, "late")], Utc::now()).await;
        assert!(matches!(result, Err(Error::ServiceClosed)));
    }

    struct Broken;

    #[async_trait::async_trait]
    impl CandidateExtractor for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn extract(&self, _turn: &Turn) -> Result<Vec<CandidateItem>> {
            Err(Error::Extraction("timeout".to_string()))
        }
    }

    #[tokio::test]
    async fn test_extractor_failure_falls_back_to_keywords() {
        let handle = PoolHandle::spawn(ScoredPool::focus(PoolConfig::default()), Arc::new(Broken));

        let events = handle
            .ingest_text(Turn::new("Big meeting with Sarah Connor"))
            .await
            .unwrap();

        assert!(!events.is_empty());
        let labels: Vec<String> = handle.all().into_iter().map(|item| item.label).collect();
        assert!(labels.contains(&"Sarah Connor".to_string()));
        assert!(labels.contains(&"meeting".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_tick_interval_keeps_service_alive() {
        let handle = spawn_focus(PoolConfig::default().with_tick_interval(0));
        let mut rx = handle.watch();
        rx.borrow_and_update();

        let changed = tokio::time::timeout(Duration::from_secs(5), rx.changed()).await;
        assert!(matches!(changed, Ok(Ok(()))));

        handle
            .ingest(vec![CandidateItem::new(ItemKind::Topic, "still running")], Utc::now())
            .await
            .unwrap();
        assert_eq!(handle.all().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_tick_publishes_view() {
        let handle = spawn_focus(PoolConfig::default().with_tick_interval(1));
        let mut rx = handle.watch();
        rx.borrow_and_update();

        let changed = tokio::time::timeout(Duration::from_secs(5), rx.changed()).await;
        assert!(matches!(changed, Ok(Ok(()))));
    }
}
