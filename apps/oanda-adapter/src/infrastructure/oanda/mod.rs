//! OANDA v20 Venue Adapter
//!
//! Implementation of the venue ports for OANDA's v20 REST and streaming APIs:
//! - Instrument metadata for the catalog
//! - NDJSON pricing stream with heartbeats
//! - Order submission and cancellation keyed by client extensions
//! - Pending orders and net positions for reconciliation
//! - Environment-aware endpoints (PRACTICE vs LIVE)

mod adapter;
pub mod api_types;
mod config;
mod error;
mod http_client;
pub mod stream;
pub mod symbology;

pub use adapter::OandaAdapter;
pub use config::{OandaConfig, OandaEnvironment, UnknownEnvironment};
pub use error::OandaError;
