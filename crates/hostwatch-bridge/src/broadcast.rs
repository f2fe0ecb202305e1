//! Fan-out of JSON messages to connected subscribers.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Messages a subscriber may fall behind by before pushes to it are dropped.
pub const SUBSCRIBER_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub uuid::Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connected subscribers, each with its own bounded queue.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, mpsc::Sender<Value>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) -> (SubscriberId, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = SubscriberId::new();
        self.subscribers.insert(id, tx);
        debug!(subscriber = %id, count = self.subscribers.len(), "Subscriber connected");
        (id, rx)
    }

    /// Returns false if `id` was not connected.
    pub fn disconnect(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber disconnected");
        }
        removed
    }

    /// Queue `message` for every subscriber and return how many accepted it.
    ///
    /// Subscribers whose receiver is gone are removed. A subscriber whose
    /// queue is full misses this message but stays connected.
    pub fn broadcast(&self, message: &Value) -> usize {
        let mut delivered = 0;

        self.subscribers.retain(|id, tx| match tx.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = %id, "Subscriber lagging, dropping message");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "Pruning closed subscriber");
                false
            }
        });

        delivered
    }

    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
