//! Domain Layer
//!
//! The innermost layer containing adapter logic with zero infrastructure dependencies.
//!
//! # Bounded Contexts
//!
//! - [`instrument`]: Instrument precision rules and the decimal codec
//! - [`market_data`]: Fixed-precision quotes
//! - [`order_execution`]: Intents, status lifecycle, broker order references
//! - [`position`]: Net position snapshots
//! - [`connection`]: Streaming connection state machine
//! - [`events`]: Events published to the engine bus

pub mod connection;
pub mod events;
pub mod instrument;
pub mod market_data;
pub mod order_execution;
pub mod position;
pub mod shared;
