//! Topic-based in-process pubsub (spec §4.9, component C9).
//!
//! One `broadcast::Sender` per topic, created lazily the same way the
//! teacher's `AppState::get_or_create_broadcast` lazily creates one channel
//! per stream id. Delivery is fire-and-forget: `publish` never awaits a
//! subscriber and a lagging subscriber only ever loses messages to itself
//! (`broadcast::error::RecvError::Lagged`), never blocks the publisher or
//! other subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::payload::DeliveryPayload;

/// Bounded per-topic mailbox depth (spec §5 "Backpressure": "Broadcaster
/// per-subscriber mailbox bounded -> drops").
const TOPIC_CAPACITY: usize = 1024;

pub type TopicReceiver = broadcast::Receiver<DeliveryPayload>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcasterStats {
    pub topic_count: usize,
    pub total_lagged: u64,
}

pub struct Broadcaster {
    registry: RwLock<HashMap<String, broadcast::Sender<DeliveryPayload>>>,
    lagged: AtomicU64,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            lagged: AtomicU64::new(0),
        }
    }

    fn get_or_create(&self, topic: &str) -> broadcast::Sender<DeliveryPayload> {
        {
            let reg = self.registry.read().unwrap();
            if let Some(tx) = reg.get(topic) {
                return tx.clone();
            }
        }
        let mut reg = self.registry.write().unwrap();
        if let Some(tx) = reg.get(topic) {
            return tx.clone();
        }
        let (tx, _rx) = broadcast::channel(TOPIC_CAPACITY);
        reg.insert(topic.to_owned(), tx.clone());
        tx
    }

    /// Register interest in `topic`; the transport layer holds the returned
    /// receiver and forwards whatever it yields to its WebSocket client.
    pub fn subscribe(&self, topic: &str) -> TopicReceiver {
        self.get_or_create(topic).subscribe()
    }

    /// Deliver `msg` to every current subscriber of `topic`. Returns the
    /// number of subscribers reached; `0` means either no one is listening
    /// or every receiver has already been dropped (both are fine — this
    /// never blocks or errors the caller).
    pub fn publish(&self, topic: &str, msg: DeliveryPayload) -> usize {
        self.get_or_create(topic).send(msg).unwrap_or(0)
    }

    /// Called by a transport-layer reader when its `recv()` surfaces
    /// `RecvError::Lagged(n)`, so the Broadcaster's drop counter (spec §5)
    /// reflects messages a slow subscriber never saw.
    pub fn record_lagged(&self, n: u64) {
        self.lagged.fetch_add(n, Ordering::Relaxed);
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            topic_count: self.registry.read().unwrap().len(),
            total_lagged: self.lagged.load(Ordering::Relaxed),
        }
    }
}
