//! Connection Bounded Context
//!
//! Lifecycle of the venue streaming connection.
//!
//! # State Machine
//!
//! ```text
//! DISCONNECTED → CONNECTING (connect)
//! CONNECTING → STREAMING (handshake ok)
//! CONNECTING → DEGRADED (handshake failed)
//! STREAMING → DEGRADED (transient I/O error or stall)
//! DEGRADED → CONNECTING (backoff elapsed)
//! any → CLOSED (explicit shutdown, terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a venue stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Receiving data.
    Streaming,
    /// Lost the connection; a reconnect is scheduled.
    Degraded,
    /// Shut down. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use ConnectionState::{Closed, Connecting, Degraded, Disconnected, Streaming};
        match (*self, next) {
            (Closed, _) => false,
            (_, Closed)
            | (Disconnected | Degraded, Connecting)
            | (Connecting, Streaming)
            | (Connecting | Streaming, Degraded) => true,
            _ => false,
        }
    }

    /// Whether the connection is delivering data.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Numeric code for gauges.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Streaming => 2.0,
            Self::Degraded => 3.0,
            Self::Closed => 4.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Illegal state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection transition {from} -> {to}")]
pub struct InvalidTransition {
    /// State before.
    pub from: ConnectionState,
    /// Rejected target.
    pub to: ConnectionState,
}
