//! Broadcast Event Bus
//!
//! Implements [`EventBusPort`] over a tokio broadcast channel so that the
//! engine, the bus logger and tests can each hold their own receiver.
//!
//! A slow receiver that falls more than `capacity` events behind loses the
//! oldest events and sees `RecvError::Lagged` on its next receive; the
//! adapter never blocks on a consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::{EventBusPort, EventPublishError};
use crate::domain::events::AdapterEvent;

/// Default channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 10_000;

/// Event bus backed by `tokio::sync::broadcast`.
///
/// ```rust
/// use oanda_adapter::infrastructure::bus::BroadcastEventBus;
///
/// let bus = BroadcastEventBus::new(16);
/// let _rx = bus.subscribe();
/// assert_eq!(bus.receiver_count(), 1);
/// ```
#[derive(Debug)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<AdapterEvent>,
    published: AtomicU64,
    unobserved: AtomicU64,
}

/// Shared bus handle.
pub type SharedEventBus = Arc<BroadcastEventBus>;

impl BroadcastEventBus {
    /// Create a bus holding up to `capacity` undelivered events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
            published: AtomicU64::new(0),
            unobserved: AtomicU64::new(0),
        }
    }

    /// New receiver seeing every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.tx.subscribe()
    }

    /// Active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Events handed to the channel.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Events published while nobody was subscribed.
    #[must_use]
    pub fn unobserved(&self) -> u64 {
        self.unobserved.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[async_trait]
impl EventBusPort for BroadcastEventBus {
    async fn publish(&self, event: AdapterEvent) -> Result<(), EventPublishError> {
        self.published.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            // No receivers: nothing to deliver to, which is not a failure.
            self.unobserved.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(kind, "Event published with no subscribers");
        }
        Ok(())
    }
}
