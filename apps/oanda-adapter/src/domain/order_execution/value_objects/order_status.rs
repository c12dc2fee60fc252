//! Order status in the adapter's lifecycle view.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status as tracked by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Registered locally, request not yet acknowledged.
    PendingNew,
    /// Transport failed after retry; the venue may or may not hold the order.
    Uncertain,
    /// Working at the venue.
    Accepted,
    /// Completely filled.
    Filled,
    /// Cancel requested, awaiting confirmation.
    PendingCancel,
    /// Cancelled.
    Canceled,
    /// Rejected by the venue.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }

    /// Returns true if the order may still be working at the venue.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(
            self,
            Self::PendingNew | Self::Uncertain | Self::Accepted | Self::PendingCancel
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingNew => write!(f, "PENDING_NEW"),
            Self::Uncertain => write!(f, "UNCERTAIN"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Filled => write!(f, "FILLED"),
            Self::PendingCancel => write!(f, "PENDING_CANCEL"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}
