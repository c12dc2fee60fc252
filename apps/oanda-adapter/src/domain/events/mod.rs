//! Adapter Events
//!
//! Events the adapter publishes onto the engine's bus:
//!
//! - quote updates from the pricing stream
//! - order status changes (acks, rejects, recoveries)
//! - position divergence and unreconciled order reports
//! - connection state changes

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::connection::ConnectionState;
use crate::domain::market_data::PriceQuote;
use crate::domain::order_execution::OrderStatus;
use crate::domain::position::PositionSnapshot;
use crate::domain::shared::{BrokerId, CorrelationTag, InstrumentId, OrderId, UnixNanos};

/// Event published by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterEvent {
    /// New top-of-book quote.
    QuoteUpdate(PriceQuote),
    /// Order status changed.
    OrderStatusUpdate(OrderStatusUpdate),
    /// Local position disagreed with the venue and was overwritten.
    PositionDivergence(PositionDivergence),
    /// Venue holds an open order the adapter cannot attribute.
    UnreconciledOrder(UnreconciledOrder),
    /// Streaming connection changed state.
    ConnectionStateChange(ConnectionStateChange),
}

impl AdapterEvent {
    /// Short event kind label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::QuoteUpdate(_) => "quote_update",
            Self::OrderStatusUpdate(_) => "order_status_update",
            Self::PositionDivergence(_) => "position_divergence",
            Self::UnreconciledOrder(_) => "unreconciled_order",
            Self::ConnectionStateChange(_) => "connection_state_change",
        }
    }
}

/// Order status change for an engine-issued order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    /// Engine-issued identifier.
    pub order_id: OrderId,
    /// Tag sent with the order.
    pub correlation_tag: CorrelationTag,
    /// Venue identifier, if known.
    pub broker_order_id: Option<BrokerId>,
    /// New status.
    pub status: OrderStatus,
    /// Rejection or uncertainty reason.
    pub reason: Option<String>,
    /// When the adapter observed the change.
    pub ts: UnixNanos,
}

/// Local position overwritten with the venue's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDivergence {
    /// Instrument affected.
    pub instrument: InstrumentId,
    /// Local value before correction.
    pub local: PositionSnapshot,
    /// Venue value now adopted.
    pub venue: PositionSnapshot,
    /// Detection time.
    pub detected_at: UnixNanos,
}

impl PositionDivergence {
    /// Venue minus local quantity.
    #[must_use]
    pub fn quantity_delta(&self) -> Decimal {
        self.venue.quantity - self.local.quantity
    }
}

/// Why an open venue order could not be attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnreconciledReason {
    /// Order carries no correlation tag (placed outside the adapter).
    Untagged,
    /// Tag does not match any intent this engine instance registered.
    UnknownTag,
}

impl fmt::Display for UnreconciledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untagged => write!(f, "UNTAGGED"),
            Self::UnknownTag => write!(f, "UNKNOWN_TAG"),
        }
    }
}

/// Open venue order with no matching local intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreconciledOrder {
    /// Venue identifier.
    pub broker_order_id: BrokerId,
    /// Tag found on the order, if any.
    pub correlation_tag: Option<CorrelationTag>,
    /// Instrument.
    pub instrument: InstrumentId,
    /// Signed remaining quantity.
    pub quantity: Decimal,
    /// Order price, if any.
    pub price: Option<Decimal>,
    /// Attribution failure.
    pub reason: UnreconciledReason,
    /// Detection time.
    pub detected_at: UnixNanos,
}

/// Connection state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStateChange {
    /// Previous state.
    pub from: ConnectionState,
    /// New state.
    pub to: ConnectionState,
    /// Transition time.
    pub at: UnixNanos,
}
