//! Order side (buy or sell).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Apply the side's sign to an unsigned quantity.
    ///
    /// Buy = +qty, Sell = -qty
    #[must_use]
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            Self::Buy => quantity.abs(),
            Self::Sell => -quantity.abs(),
        }
    }

    /// Side implied by a signed venue quantity.
    ///
    /// Returns `None` for zero.
    #[must_use]
    pub fn from_signed(quantity: Decimal) -> Option<Self> {
        if quantity > Decimal::ZERO {
            Some(Self::Buy)
        } else if quantity < Decimal::ZERO {
            Some(Self::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}
