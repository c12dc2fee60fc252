//! Configuration Module
//!
//! Configuration loading for the adapter binary.

mod settings;

pub use settings::{AdapterConfig, ConfigError, Credentials, ServerSettings, StreamSettings};
