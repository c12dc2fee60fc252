//! Mapping from engine-issued orders to their venue identity.

use serde::{Deserialize, Serialize};

use crate::domain::shared::{BrokerId, CorrelationTag, OrderId};

/// Links an engine-issued order to the correlation tag sent with it and to
/// the venue's own identifier once assigned.
///
/// The venue echoes the tag on every status report, so the reference can be
/// rebuilt from the venue's order list after a restart or reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerOrderRef {
    /// Engine-issued identifier.
    pub order_id: OrderId,
    /// Tag attached at submission.
    pub correlation_tag: CorrelationTag,
    /// Venue identifier, once known.
    pub broker_order_id: Option<BrokerId>,
}

impl BrokerOrderRef {
    /// Create a reference for a freshly registered order.
    #[must_use]
    pub fn new(order_id: OrderId) -> Self {
        Self {
            correlation_tag: CorrelationTag::for_order(&order_id),
            order_id,
            broker_order_id: None,
        }
    }

    /// Attach the venue identifier.
    #[must_use]
    pub fn with_broker_id(mut self, broker_order_id: BrokerId) -> Self {
        self.broker_order_id = Some(broker_order_id);
        self
    }

    /// Whether the venue identifier is known.
    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        self.broker_order_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ref_derives_tag_from_order_id() {
        let order_ref = BrokerOrderRef::new(OrderId::new("o-1"));
        assert_eq!(order_ref.correlation_tag.as_str(), "o-1");
        assert!(!order_ref.is_acknowledged());
    }

    #[test]
    fn with_broker_id_acknowledges() {
        let order_ref =
            BrokerOrderRef::new(OrderId::new("o-1")).with_broker_id(BrokerId::new("42"));
        assert!(order_ref.is_acknowledged());
        assert_eq!(order_ref.broker_order_id.unwrap().as_str(), "42");
    }
}
