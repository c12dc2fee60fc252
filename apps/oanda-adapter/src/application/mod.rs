//! Application Layer
//!
//! The application layer orchestrates domain logic through ports.
//! It defines:
//!
//! - **Ports**: Interfaces to the venue and the engine's bus
//! - **Services**: Catalog, streaming, execution, and reconciliation

pub mod ports;
pub mod services;

pub use ports::*;
pub use services::*;
