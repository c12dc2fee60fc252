//! Shared Domain Types
//!
//! Identifiers and timestamps shared across bounded contexts.

mod identifiers;
mod timestamp;

pub use identifiers::{BrokerId, CorrelationTag, InstrumentId, MAX_CORRELATION_TAG_LEN, OrderId};
pub use timestamp::{TimestampError, UnixNanos};
