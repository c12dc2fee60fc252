//! Venue Adapter Port (Driver Port)
//!
//! The capability surface the engine programs against. Each venue backend
//! implements it once; the engine never sees venue types.

use async_trait::async_trait;

use crate::application::services::{
    ExecutionError, ReconciliationError, ReconciliationReport, SessionError,
};
use crate::domain::connection::ConnectionState;
use crate::domain::order_execution::{BrokerOrderRef, OrderIntent};

/// Pluggable venue backend.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue name for logs.
    fn venue(&self) -> &str;

    /// Load instruments and start streaming.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Submit an order intent.
    async fn submit(&self, intent: OrderIntent) -> Result<BrokerOrderRef, ExecutionError>;

    /// Cancel a previously submitted order.
    async fn cancel(&self, order: &BrokerOrderRef) -> Result<(), ExecutionError>;

    /// Run a reconciliation pass on demand.
    async fn reconcile(&self) -> Result<ReconciliationReport, ReconciliationError>;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Stop streaming and refuse further orders.
    async fn shutdown(&self);
}
