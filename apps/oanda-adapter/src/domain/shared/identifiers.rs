//! Strongly-typed identifiers for adapter entities.
//!
//! These prevent mixing up engine-issued, venue-issued, and correlation IDs.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(OrderId, "Engine-issued order identifier, unique per engine instance.");
define_id!(BrokerId, "Venue-assigned order identifier.");
define_id!(
    InstrumentId,
    "Venue-neutral instrument symbol (e.g. `EUR/USD`)."
);
define_id!(
    CorrelationTag,
    "Caller-supplied tag the venue echoes back on every status report for an order."
);

impl OrderId {
    /// Generate a new unique identifier using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Longest correlation tag the venue accepts.
pub const MAX_CORRELATION_TAG_LEN: usize = 128;

impl CorrelationTag {
    /// Derive the correlation tag for an engine-issued order.
    ///
    /// The tag is the order identifier itself, so the venue's echo maps back
    /// to the originating intent without any local lookup table.
    #[must_use]
    pub fn for_order(order_id: &OrderId) -> Self {
        Self(order_id.as_str().to_string())
    }

    /// Recover the engine-issued identifier carried by this tag.
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.0.clone())
    }

    /// Check that the tag fits the venue's client extension constraints.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_CORRELATION_TAG_LEN
            && !self.0.chars().any(char::is_whitespace)
    }
}
