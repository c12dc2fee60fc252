#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! OANDA Adapter - Venue Backend for the Trading Engine
//!
//! Connects the engine's event bus to OANDA's v20 API: loads instrument
//! precision once per session, republishes streamed prices as
//! fixed-precision quotes, submits and cancels orders behind a token-bucket
//! limiter, and reconciles open orders and positions on every (re)connect.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Instrument precision and the decimal codec, quotes, order
//!   intents and status, positions, the connection state machine, events
//!
//! - **Application**: Ports and services
//!   - `ports`: Venue capabilities, the event bus, the `VenueAdapter` trait
//!   - `services`: Catalog, streaming client, execution client,
//!     reconciliation engine, and the session that wires them together
//!
//! - **Resilience**: Token-bucket rate limiter and reconnect backoff
//!
//! - **Infrastructure**: Adapters and process plumbing
//!   - `oanda`: v20 REST and NDJSON streaming adapter
//!   - `bus`: Broadcast channel event bus
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Data Flow
//!
//! ```text
//! OANDA pricing stream ──► StreamingClient ──► codec ──► QuoteUpdate ──┐
//!                                                                      │
//! engine ──► VenueSession::submit ──► ExecutionClient ──► OANDA orders │
//!                                                                      ▼
//! (re)connect ──► ReconciliationEngine ──► divergence / recovery ──► event bus
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Adapter types with no infrastructure dependencies.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Resilience primitives - rate limiting and backoff.
pub mod resilience;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::events::AdapterEvent;
pub use domain::instrument::{CodecError, Instrument};
pub use domain::order_execution::{
    BrokerOrderRef, OrderIntent, OrderSide, OrderStatus, OrderType, TimeInForce,
};
pub use domain::position::PositionSnapshot;
pub use domain::shared::{BrokerId, CorrelationTag, InstrumentId, OrderId, UnixNanos};

// Application
pub use application::ports::{EventBusPort, VenueAdapter};
pub use application::services::{
    ExecutionError, ReconciliationError, ReconciliationReport, SessionConfig, SessionError,
    VenueSession,
};

// Infrastructure
pub use infrastructure::bus::BroadcastEventBus;
pub use infrastructure::config::{AdapterConfig, ConfigError};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::oanda::{OandaAdapter, OandaConfig, OandaEnvironment, OandaError};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
