//! Tick delivery keyed by event name
//!
//! Each event name gets its own broadcast channel. Subscribers hold a
//! [`TickSubscription`]; dropping it (or calling `unsubscribe`) detaches the
//! receiver from the channel.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::Tick;

pub mod redis;

pub use self::redis::RedisTickBridge;
pub use broadcast::error::RecvError;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Source of ticks the engine subscribes to
pub trait TickFeed: Send + Sync {
    fn subscribe(&self, event: &str) -> TickSubscription;
}

/// Live subscription to one event's ticks
#[derive(Debug)]
pub struct TickSubscription {
    event: String,
    receiver: broadcast::Receiver<Tick>,
}

impl TickSubscription {
    pub fn new(event: impl Into<String>, receiver: broadcast::Receiver<Tick>) -> Self {
        Self {
            event: event.into(),
            receiver,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Next tick; `Lagged` when this subscriber fell behind, `Closed` when the
    /// feed is gone
    pub async fn recv(&mut self) -> Result<Tick, RecvError> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        trace!(event = %self.event, "Unsubscribed from tick feed");
    }
}

/// In-process tick feed backed by tokio broadcast channels
pub struct BroadcastTickFeed {
    channels: Mutex<HashMap<String, broadcast::Sender<Tick>>>,
    capacity: usize,
}

impl Default for BroadcastTickFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastTickFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, event: &str) -> broadcast::Sender<Tick> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(event.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish a tick; returns how many subscribers will see it
    pub fn publish(&self, event: &str, tick: Tick) -> usize {
        // No subscribers is not an error, the tick is simply dropped
        self.sender(event).send(tick).unwrap_or(0)
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl TickFeed for BroadcastTickFeed {
    fn subscribe(&self, event: &str) -> TickSubscription {
        TickSubscription::new(event, self.sender(event).subscribe())
    }
}
