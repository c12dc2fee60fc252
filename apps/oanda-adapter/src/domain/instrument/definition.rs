//! Instrument definition and increments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::InstrumentId;

/// Largest exponent `rust_decimal` can represent.
pub const MAX_INCREMENT_EXPONENT: u32 = 28;

/// A power-of-ten step: `10^-exponent`.
///
/// `Increment::from_exponent(5)` is `0.00001`, `Increment::from_exponent(0)` is `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Increment(u32);

impl Increment {
    /// Build an increment from its decimal-places exponent.
    ///
    /// Returns `None` if the exponent exceeds the decimal type's scale.
    #[must_use]
    pub const fn from_exponent(places: u32) -> Option<Self> {
        if places > MAX_INCREMENT_EXPONENT {
            None
        } else {
            Some(Self(places))
        }
    }

    /// Number of decimal places (the canonical scale).
    #[must_use]
    pub const fn exponent(&self) -> u32 {
        self.0
    }

    /// The step as a decimal.
    #[must_use]
    pub fn step(&self) -> Decimal {
        Decimal::new(1, self.0)
    }

    /// Whether `value` is an exact multiple of this step.
    #[must_use]
    pub fn divides(&self, value: Decimal) -> bool {
        value.normalize().scale() <= self.0
    }
}

impl fmt::Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step())
    }
}

/// A tradable instrument with its precision rules.
///
/// Immutable once loaded; shared by `Arc` from the instrument catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Venue-neutral symbol.
    pub id: InstrumentId,
    /// Human-readable name.
    pub display_name: String,
    /// Smallest valid price step.
    pub price_increment: Increment,
    /// Smallest valid size step.
    pub size_increment: Increment,
    /// Minimum absolute order size.
    pub minimum_size: Decimal,
}

impl Instrument {
    /// Create an instrument definition.
    #[must_use]
    pub fn new(
        id: InstrumentId,
        price_increment: Increment,
        size_increment: Increment,
        minimum_size: Decimal,
    ) -> Self {
        Self {
            display_name: id.as_str().to_string(),
            id,
            price_increment,
            size_increment,
            minimum_size,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Canonical number of decimal places for prices.
    #[must_use]
    pub const fn price_precision(&self) -> u32 {
        self.price_increment.exponent()
    }

    /// Canonical number of decimal places for sizes.
    #[must_use]
    pub const fn size_precision(&self) -> u32 {
        self.size_increment.exponent()
    }
}
