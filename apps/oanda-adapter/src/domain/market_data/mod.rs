//! Market Data Bounded Context
//!
//! Fixed-precision quotes produced from the venue's pricing stream.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{InstrumentId, UnixNanos};

/// Top-of-book quote for one instrument.
///
/// Both prices are exact multiples of the instrument's price increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Instrument quoted.
    pub instrument: InstrumentId,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Venue timestamp.
    pub ts_event: UnixNanos,
    /// Time the adapter decoded the message.
    pub ts_init: UnixNanos,
}

impl PriceQuote {
    /// Mid price.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// True when the book is crossed (bid above ask).
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        self.bid > self.ask
    }
}
