//! Position Bounded Context
//!
//! Net position snapshots as reported by the venue or tracked locally.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::OrderSide;
use crate::domain::shared::InstrumentId;

/// Net position in one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Instrument held.
    pub instrument: InstrumentId,
    /// Signed net quantity (negative = short).
    pub quantity: Decimal,
    /// Average entry price of the net quantity.
    pub avg_price: Decimal,
}

impl PositionSnapshot {
    /// Create a snapshot.
    #[must_use]
    pub const fn new(instrument: InstrumentId, quantity: Decimal, avg_price: Decimal) -> Self {
        Self {
            instrument,
            quantity,
            avg_price,
        }
    }

    /// A flat position.
    #[must_use]
    pub const fn flat(instrument: InstrumentId) -> Self {
        Self::new(instrument, Decimal::ZERO, Decimal::ZERO)
    }

    /// Whether the net quantity is zero.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Net direction, `None` when flat.
    #[must_use]
    pub fn side(&self) -> Option<OrderSide> {
        OrderSide::from_signed(self.quantity)
    }

    /// Compare quantity and price by value.
    ///
    /// Scale differences (`1.1` vs `1.10000`) are not divergences. Two flat
    /// positions agree regardless of their recorded price.
    #[must_use]
    pub fn agrees_with(&self, other: &Self) -> bool {
        if self.is_flat() && other.is_flat() {
            return true;
        }
        self.quantity == other.quantity && self.avg_price == other.avg_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eur_usd(qty: Decimal, px: Decimal) -> PositionSnapshot {
        PositionSnapshot::new(InstrumentId::new("EUR/USD"), qty, px)
    }

    #[test]
    fn side_follows_sign() {
        assert_eq!(eur_usd(dec!(10), dec!(1.1)).side(), Some(OrderSide::Buy));
        assert_eq!(eur_usd(dec!(-10), dec!(1.1)).side(), Some(OrderSide::Sell));
        assert_eq!(PositionSnapshot::flat(InstrumentId::new("EUR/USD")).side(), None);
    }

    #[test]
    fn agreement_ignores_scale() {
        assert!(eur_usd(dec!(10000), dec!(1.1)).agrees_with(&eur_usd(dec!(10000), dec!(1.10000))));
    }

    #[test]
    fn disagreement_on_quantity_or_price() {
        let broker = eur_usd(dec!(10000), dec!(1.10000));
        assert!(!eur_usd(dec!(5000), dec!(1.10000)).agrees_with(&broker));
        assert!(!eur_usd(dec!(10000), dec!(1.09000)).agrees_with(&broker));
    }

    #[test]
    fn flat_positions_agree() {
        let a = eur_usd(dec!(0), dec!(1.2));
        let b = PositionSnapshot::flat(InstrumentId::new("EUR/USD"));
        assert!(a.agrees_with(&b));
    }
}
