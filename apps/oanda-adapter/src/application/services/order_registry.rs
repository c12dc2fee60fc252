//! Order Registry
//!
//! Tracks every intent the adapter has sent, keyed by correlation tag. It is
//! the only place that answers "is this venue order mine?".

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::order_execution::{BrokerOrderRef, OrderIntent, OrderStatus};
use crate::domain::shared::{BrokerId, CorrelationTag, OrderId};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Another intent already uses this tag.
    #[error("correlation tag collision: {0}")]
    CorrelationCollision(CorrelationTag),

    /// Tag cannot be carried by the venue.
    #[error("invalid correlation tag: {0}")]
    InvalidTag(CorrelationTag),
}

/// An intent with its venue reference and last known status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedOrder {
    /// Intent as submitted.
    pub intent: OrderIntent,
    /// Venue reference.
    pub order_ref: BrokerOrderRef,
    /// Last known status.
    pub status: OrderStatus,
}

/// Result of matching a venue order back to a tracked intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Tag not registered.
    Unknown,
    /// Already up to date.
    Unchanged(TrackedOrder),
    /// Reference or status updated.
    Updated(TrackedOrder),
}

/// Correlation-tag keyed order registry.
#[derive(Debug, Default)]
pub struct OrderRegistry {
    orders: RwLock<HashMap<CorrelationTag, TrackedOrder>>,
}

impl OrderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an intent under its derived tag.
    pub fn register(&self, intent: &OrderIntent) -> Result<BrokerOrderRef, RegistryError> {
        let order_ref = BrokerOrderRef::new(intent.order_id.clone());
        let tag = order_ref.correlation_tag.clone();
        if !tag.is_valid() {
            return Err(RegistryError::InvalidTag(tag));
        }

        let mut orders = self.orders.write();
        if orders.contains_key(&tag) {
            return Err(RegistryError::CorrelationCollision(tag));
        }
        orders.insert(
            tag,
            TrackedOrder {
                intent: intent.clone(),
                order_ref: order_ref.clone(),
                status: OrderStatus::PendingNew,
            },
        );
        Ok(order_ref)
    }

    /// Record the venue acknowledgment.
    pub fn record_ack(
        &self,
        tag: &CorrelationTag,
        broker_order_id: BrokerId,
        status: OrderStatus,
    ) -> Option<BrokerOrderRef> {
        let mut orders = self.orders.write();
        let tracked = orders.get_mut(tag)?;
        tracked.order_ref.broker_order_id = Some(broker_order_id);
        tracked.status = status;
        Some(tracked.order_ref.clone())
    }

    /// Set the status, returning the previous one.
    pub fn set_status(&self, tag: &CorrelationTag, status: OrderStatus) -> Option<OrderStatus> {
        let mut orders = self.orders.write();
        let tracked = orders.get_mut(tag)?;
        Some(std::mem::replace(&mut tracked.status, status))
    }

    /// Match an open venue order back to its intent and refresh it.
    pub fn recover(
        &self,
        tag: &CorrelationTag,
        broker_order_id: &BrokerId,
        status: OrderStatus,
    ) -> Recovery {
        let mut orders = self.orders.write();
        let Some(tracked) = orders.get_mut(tag) else {
            return Recovery::Unknown;
        };

        let same_id = tracked.order_ref.broker_order_id.as_ref() == Some(broker_order_id);
        if same_id && tracked.status == status {
            return Recovery::Unchanged(tracked.clone());
        }

        tracked.order_ref.broker_order_id = Some(broker_order_id.clone());
        tracked.status = status;
        Recovery::Updated(tracked.clone())
    }

    /// Drop an intent that never reached the venue.
    pub fn forget(&self, tag: &CorrelationTag) -> Option<TrackedOrder> {
        self.orders.write().remove(tag)
    }

    /// Tracked order by tag.
    #[must_use]
    pub fn get(&self, tag: &CorrelationTag) -> Option<TrackedOrder> {
        self.orders.read().get(tag).cloned()
    }

    /// Tracked order by engine-issued id.
    #[must_use]
    pub fn get_by_order_id(&self, order_id: &OrderId) -> Option<TrackedOrder> {
        self.get(&CorrelationTag::for_order(order_id))
    }

    /// Whether `tag` belongs to a registered intent.
    #[must_use]
    pub fn contains(&self, tag: &CorrelationTag) -> bool {
        self.orders.read().contains_key(tag)
    }

    /// Orders that may still be working at the venue.
    #[must_use]
    pub fn open_orders(&self) -> Vec<TrackedOrder> {
        let mut open: Vec<_> = self
            .orders
            .read()
            .values()
            .filter(|tracked| tracked.status.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.order_ref.correlation_tag.cmp(&b.order_ref.correlation_tag));
        open
    }

    /// Number of registered intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}
