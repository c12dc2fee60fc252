//! Time in force.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How long an order stays working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good until cancelled.
    #[default]
    Gtc,
    /// Good for the trading day.
    Gfd,
    /// Fill completely or cancel.
    Fok,
    /// Fill what is possible immediately, cancel the rest.
    Ioc,
}

impl TimeInForce {
    /// Venue wire code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Gfd => "GFD",
            Self::Fok => "FOK",
            Self::Ioc => "IOC",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
