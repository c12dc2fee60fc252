//! Order intents issued by the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{OrderSide, OrderType, TimeInForce};
use crate::domain::shared::{InstrumentId, OrderId};

/// Reasons an intent is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    /// Quantity must be strictly positive; direction comes from the side.
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    /// Limit and stop orders need a price.
    #[error("{0} order requires a price")]
    MissingPrice(OrderType),

    /// Market orders must not carry a price.
    #[error("{0} order must not carry a price")]
    UnexpectedPrice(OrderType),
}

/// A request from the strategy layer to trade.
///
/// Never mutated after submission; a cancel refers back to the same
/// `order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Engine-issued identifier.
    pub order_id: OrderId,
    /// Instrument to trade.
    pub instrument: InstrumentId,
    /// Direction.
    pub side: OrderSide,
    /// Unsigned quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Limit or trigger price.
    pub price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
}

impl OrderIntent {
    /// Create a market order intent.
    #[must_use]
    pub const fn market(
        order_id: OrderId,
        instrument: InstrumentId,
        side: OrderSide,
        quantity: Decimal,
    ) -> Self {
        Self {
            order_id,
            instrument,
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            time_in_force: TimeInForce::Fok,
        }
    }

    /// Create a limit order intent.
    #[must_use]
    pub const fn limit(
        order_id: OrderId,
        instrument: InstrumentId,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            order_id,
            instrument,
            side,
            quantity,
            order_type: OrderType::Limit,
            price: Some(price),
            time_in_force: TimeInForce::Gtc,
        }
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Check structural consistency.
    pub fn validate(&self) -> Result<(), IntentError> {
        if self.quantity <= Decimal::ZERO {
            return Err(IntentError::NonPositiveQuantity(self.quantity));
        }
        match (self.order_type.requires_price(), self.price.is_some()) {
            (true, false) => Err(IntentError::MissingPrice(self.order_type)),
            (false, true) => Err(IntentError::UnexpectedPrice(self.order_type)),
            _ => Ok(()),
        }
    }

    /// Quantity signed by side (venue unit convention).
    #[must_use]
    pub fn signed_quantity(&self) -> Decimal {
        self.side.signed(self.quantity)
    }
}
