//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process-level plumbing the
//! binary needs.

/// OANDA v20 REST and streaming adapter.
pub mod oanda;

/// Broadcast channel implementation of the event bus.
pub mod bus;

/// Environment-driven configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics recorder.
pub mod metrics;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;
