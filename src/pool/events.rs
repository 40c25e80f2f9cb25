//! Change notifications for downstream consumers (prompt assembly, UI).

use super::item::{Item, Tier};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Why an item left the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Pruned,
    Evicted,
    Cleared,
}

/// What happened to an item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Added,
    Updated,
    TierChanged { from: Tier, to: Tier },
    Removed { reason: RemovalReason },
}

/// One item transition, carrying the item's state after it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub item: Item,
}

impl PoolEvent {
    pub fn added(item: &Item) -> Self {
        Self { kind: EventKind::Added, item: item.clone() }
    }

    pub fn updated(item: &Item) -> Self {
        Self { kind: EventKind::Updated, item: item.clone() }
    }

    pub fn tier_changed(item: &Item, from: Tier) -> Self {
        Self {
            kind: EventKind::TierChanged { from, to: item.tier },
            item: item.clone(),
        }
    }

    pub fn removed(item: Item, reason: RemovalReason) -> Self {
        Self { kind: EventKind::Removed { reason }, item }
    }
}

/// Fans pool events out to any number of subscribers.
///
/// Slow subscribers lag and lose the oldest events; the pool never waits.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<PoolEvent>,
}

impl ChangeNotifier {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn publish(&self, events: Vec<PoolEvent>) {
        if events.is_empty() {
            return;
        }
        let count = events.len();
        for event in events {
            // no subscribers is fine
            let _ = self.tx.send(event);
        }
        debug!("Published {} pool events to {} subscribers", count, self.tx.receiver_count());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream, skipping over lag gaps.
    pub fn stream(&self) -> impl Stream<Item = PoolEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| result.ok())
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}
