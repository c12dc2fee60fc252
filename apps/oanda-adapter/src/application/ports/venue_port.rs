//! Venue Ports (Driven Ports)
//!
//! The four capabilities the adapter needs from a venue:
//!
//! - [`InstrumentMetadataPort`]: instrument definitions for the catalog
//! - [`PricingStreamPort`]: the streaming quote feed
//! - [`OrderGatewayPort`]: order submission and cancellation
//! - [`AccountStatePort`]: open orders and positions for reconciliation
//!
//! Prices and sizes cross these ports as text so that the decimal codec,
//! not the transport, decides what is representable.

use async_trait::async_trait;
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderSide, OrderStatus, OrderType, TimeInForce};
use crate::domain::position::PositionSnapshot;
use crate::domain::shared::{BrokerId, CorrelationTag, InstrumentId};

// ============================================================================
// Errors
// ============================================================================

/// Venue port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    /// Network failure, timeout, or server-side (5xx) error.
    #[error("venue transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Request understood and refused.
    #[error("venue rejected request: {reason}")]
    Rejected {
        /// Rejection reason.
        reason: String,
    },

    /// Referenced entity does not exist.
    #[error("not found at venue: {id}")]
    NotFound {
        /// The missing identifier.
        id: String,
    },

    /// Venue-side rate limit hit.
    #[error("rate limited by venue")]
    RateLimited,

    /// Credentials refused.
    #[error("venue authentication failed: {message}")]
    Authentication {
        /// Error details.
        message: String,
    },

    /// Response could not be understood.
    #[error("venue protocol error: {message}")]
    Protocol {
        /// Error details.
        message: String,
    },
}

impl VenueError {
    /// Whether the request may not have reached the venue, or failed there
    /// for reasons unrelated to its content.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Instrument metadata
// ============================================================================

/// Raw instrument definition as published by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMetadata {
    /// Venue-neutral symbol (`EUR/USD`).
    pub symbol: InstrumentId,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Decimal places of the price increment.
    pub display_precision: u32,
    /// Decimal places of the size increment.
    pub trade_units_precision: u32,
    /// Minimum order size as decimal text.
    pub minimum_trade_size: String,
}

/// Source of instrument definitions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstrumentMetadataPort: Send + Sync {
    /// Fetch definitions for all tradeable instruments of the account.
    async fn fetch_instruments(&self) -> Result<Vec<InstrumentMetadata>, VenueError>;
}

// ============================================================================
// Pricing stream
// ============================================================================

/// Raw top-of-book price exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPrice {
    /// Venue-neutral symbol.
    pub instrument: InstrumentId,
    /// Best bid as text.
    pub bid: String,
    /// Best ask as text.
    pub ask: String,
    /// Venue timestamp (RFC3339).
    pub time: String,
}

/// One message from the pricing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Price update.
    Price(RawPrice),
    /// Keep-alive.
    Heartbeat {
        /// Venue timestamp (RFC3339).
        time: String,
    },
    /// Line that could not be decoded.
    Malformed {
        /// What was wrong with it.
        reason: String,
    },
}

/// Open pricing stream. Ends (`None`) when the venue closes the connection.
pub type PriceStream = BoxStream<'static, Result<StreamMessage, VenueError>>;

/// Streaming price source.
#[async_trait]
pub trait PricingStreamPort: Send + Sync {
    /// Open a stream for `instruments`. Returning `Ok` completes the handshake.
    async fn open_stream(&self, instruments: &[InstrumentId]) -> Result<PriceStream, VenueError>;
}

// ============================================================================
// Order gateway
// ============================================================================

/// Fully encoded order ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSubmission {
    /// Tag attached to the order for attribution.
    pub correlation_tag: CorrelationTag,
    /// Venue-neutral symbol.
    pub instrument: InstrumentId,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Unsigned quantity text at the instrument's size scale.
    pub quantity: String,
    /// Price text at the instrument's price scale.
    pub price: Option<String>,
    /// Time in force.
    pub time_in_force: TimeInForce,
}

/// Venue acknowledgment of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueOrderAck {
    /// Venue-assigned order id.
    pub broker_order_id: BrokerId,
    /// Status implied by the response.
    pub status: OrderStatus,
    /// Reason attached to an immediate cancel.
    pub reason: Option<String>,
}

/// Which order a cancel addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    /// By venue-assigned id.
    Broker(BrokerId),
    /// By the correlation tag attached at submission.
    Tag(CorrelationTag),
}

/// Order entry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGatewayPort: Send + Sync {
    /// Submit one order. Never retried below this port.
    async fn submit_order(&self, order: &OrderSubmission) -> Result<VenueOrderAck, VenueError>;

    /// Cancel one order.
    async fn cancel_order(&self, target: &CancelTarget) -> Result<(), VenueError>;
}

// ============================================================================
// Account state
// ============================================================================

/// Open order as held by the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueOrder {
    /// Venue-assigned id.
    pub broker_order_id: BrokerId,
    /// Tag read back from the order, if any.
    pub correlation_tag: Option<CorrelationTag>,
    /// Venue-neutral symbol.
    pub instrument: InstrumentId,
    /// Signed remaining quantity.
    pub quantity: Decimal,
    /// Order price, if any.
    pub price: Option<Decimal>,
    /// Status mapped from the venue's order state.
    pub status: OrderStatus,
}

/// Authoritative account state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStatePort: Send + Sync {
    /// All working orders.
    async fn open_orders(&self) -> Result<Vec<VenueOrder>, VenueError>;

    /// All non-flat net positions.
    async fn open_positions(&self) -> Result<Vec<PositionSnapshot>, VenueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(VenueError::transport("timeout").is_transport());
        assert!(!VenueError::RateLimited.is_transport());
        assert!(
            !VenueError::Rejected {
                reason: "MARKET_HALTED".into()
            }
            .is_transport()
        );
        assert!(!VenueError::protocol("bad json").is_transport());
    }

    #[test]
    fn metadata_deserializes_without_display_name() {
        let json = r#"{
            "symbol": "EUR/USD",
            "display_precision": 5,
            "trade_units_precision": 0,
            "minimum_trade_size": "1"
        }"#;
        let meta: InstrumentMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.symbol, InstrumentId::new("EUR/USD"));
        assert!(meta.display_name.is_none());
    }
}
