//! Application Services
//!
//! Application services coordinate domain logic and the venue ports. The
//! streaming client runs as a background task; the rest are called from it
//! or from the engine through [`VenueSession`].

mod connection_monitor;
mod execution_client;
mod instrument_catalog;
mod order_registry;
mod position_book;
mod reconciliation;
mod streaming_client;
mod venue_session;

pub use connection_monitor::{ConnectionMonitor, ConnectionStatus, WaitError};
pub use execution_client::{ExecutionClient, ExecutionError};
pub use instrument_catalog::{CatalogError, InstrumentCatalog, build_instrument};
pub use order_registry::{OrderRegistry, Recovery, RegistryError, TrackedOrder};
pub use position_book::PositionBook;
pub use reconciliation::{ReconciliationEngine, ReconciliationError, ReconciliationReport};
pub use streaming_client::{
    StreamError, StreamStats, StreamStatsSnapshot, StreamingClient, StreamingConfig,
};
pub use venue_session::{SessionConfig, SessionError, VenueSession};
