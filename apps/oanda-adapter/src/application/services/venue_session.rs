//! Venue Session
//!
//! Wires the catalog, streaming client, execution client, and reconciliation
//! engine around one venue backend and exposes them through
//! [`VenueAdapter`]. A session connects once; after [`VenueAdapter::shutdown`]
//! it is closed for good.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AccountStatePort, EventBusPort, InstrumentMetadata, InstrumentMetadataPort, OrderGatewayPort,
    PricingStreamPort, VenueAdapter,
};
use crate::domain::connection::ConnectionState;
use crate::domain::events::AdapterEvent;
use crate::domain::order_execution::{BrokerOrderRef, OrderIntent};
use crate::resilience::{RateLimiter, RateLimiterConfig};

use super::connection_monitor::{ConnectionMonitor, WaitError};
use super::execution_client::{ExecutionClient, ExecutionError};
use super::instrument_catalog::{CatalogError, InstrumentCatalog};
use super::order_registry::OrderRegistry;
use super::position_book::PositionBook;
use super::reconciliation::{ReconciliationEngine, ReconciliationError, ReconciliationReport};
use super::streaming_client::{StreamError, StreamStats, StreamingClient, StreamingConfig};

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Instrument catalog could not be loaded. Fatal at startup.
    #[error("instrument catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// `connect` called twice.
    #[error("session already connected")]
    AlreadyConnected,

    /// Operation needs a connected session.
    #[error("session not connected")]
    NotConnected,

    /// Wait did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<WaitError> for SessionError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout(waited) => Self::Timeout(waited),
            WaitError::Closed => Self::NotConnected,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Venue name for logs.
    pub venue: String,
    /// Pricing stream settings.
    pub streaming: StreamingConfig,
    /// Order rate limiter.
    pub order_rate: RateLimiterConfig,
    /// Real-money account.
    pub live: bool,
    /// Use these definitions instead of querying the venue.
    pub static_instruments: Option<Vec<InstrumentMetadata>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            venue: "venue".to_string(),
            streaming: StreamingConfig::default(),
            order_rate: RateLimiterConfig::default(),
            live: false,
            static_instruments: None,
        }
    }
}

/// One venue connection with its local state.
pub struct VenueSession<V, B>
where
    V: InstrumentMetadataPort + PricingStreamPort + OrderGatewayPort + AccountStatePort + 'static,
    B: EventBusPort + 'static,
{
    venue: Arc<V>,
    bus: Arc<B>,
    config: SessionConfig,
    catalog: Arc<InstrumentCatalog>,
    monitor: Arc<ConnectionMonitor>,
    registry: Arc<OrderRegistry>,
    positions: Arc<PositionBook>,
    reconciler: Arc<ReconciliationEngine<V, B>>,
    streaming: Arc<StreamingClient<V, V, B>>,
    execution: ExecutionClient<V, B>,
    shutdown_token: CancellationToken,
    stream_task: Mutex<Option<JoinHandle<Result<(), StreamError>>>>,
}

impl<V, B> VenueSession<V, B>
where
    V: InstrumentMetadataPort + PricingStreamPort + OrderGatewayPort + AccountStatePort + 'static,
    B: EventBusPort + 'static,
{
    /// Build a session. Nothing touches the network until [`connect`](VenueAdapter::connect).
    pub fn new(venue: Arc<V>, bus: Arc<B>, config: SessionConfig) -> Self {
        let catalog = Arc::new(InstrumentCatalog::new());
        let monitor = Arc::new(ConnectionMonitor::new());
        let registry = Arc::new(OrderRegistry::new());
        let positions = Arc::new(PositionBook::new());

        let reconciler = Arc::new(ReconciliationEngine::new(
            Arc::clone(&venue),
            Arc::clone(&registry),
            Arc::clone(&positions),
            Arc::clone(&bus),
        ));
        let streaming = Arc::new(StreamingClient::new(
            Arc::clone(&venue),
            Arc::clone(&bus),
            Arc::clone(&catalog),
            Arc::clone(&monitor),
            Arc::clone(&reconciler),
            config.streaming.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new("orders", config.order_rate.clone()));
        let execution = ExecutionClient::new(
            Arc::clone(&venue),
            Arc::clone(&bus),
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Arc::clone(&monitor),
            limiter,
        )
        .with_live_trading(config.live);

        Self {
            venue,
            bus,
            config,
            catalog,
            monitor,
            registry,
            positions,
            reconciler,
            streaming,
            execution,
            shutdown_token: CancellationToken::new(),
            stream_task: Mutex::new(None),
        }
    }

    /// Connection monitor.
    #[must_use]
    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    /// Instrument catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<InstrumentCatalog> {
        &self.catalog
    }

    /// Local order registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<OrderRegistry> {
        &self.registry
    }

    /// Local position book.
    #[must_use]
    pub fn positions(&self) -> &Arc<PositionBook> {
        &self.positions
    }

    /// Stream counters.
    #[must_use]
    pub fn stream_stats(&self) -> Arc<StreamStats> {
        self.streaming.stats()
    }

    /// Reload instruments from the venue.
    pub async fn reload_instruments(&self) -> Result<usize, CatalogError> {
        self.catalog.reload(self.venue.as_ref()).await
    }

    /// Wait until the connection reaches `state`.
    ///
    /// `Streaming` is reached before the reconnect reconciliation runs, so
    /// callers about to send orders should use [`Self::wait_until_ready`].
    pub async fn wait_for_state(
        &self,
        state: ConnectionState,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        self.monitor.wait_for_state(state, timeout).await?;
        Ok(())
    }

    /// Wait until orders are accepted (streaming and reconciled).
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), SessionError> {
        self.monitor.wait_until_ready(timeout).await?;
        Ok(())
    }

    async fn load_catalog(&self) -> Result<usize, CatalogError> {
        match &self.config.static_instruments {
            Some(definitions) => {
                tracing::info!(count = definitions.len(), "Using static instrument definitions");
                self.catalog.load_static(definitions.clone())
            }
            None => self.catalog.load(self.venue.as_ref()).await,
        }
    }
}

#[async_trait]
impl<V, B> VenueAdapter for VenueSession<V, B>
where
    V: InstrumentMetadataPort + PricingStreamPort + OrderGatewayPort + AccountStatePort + 'static,
    B: EventBusPort + 'static,
{
    fn venue(&self) -> &str {
        &self.config.venue
    }

    async fn connect(&self) -> Result<(), SessionError> {
        if self.monitor.state().is_terminal() {
            return Err(SessionError::NotConnected);
        }
        if self.stream_task.lock().is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let loaded = self.load_catalog().await.inspect_err(|e| {
            tracing::error!(
                venue = %self.config.venue,
                error = %e,
                "Instrument catalog load failed"
            );
        })?;

        let streaming = Arc::clone(&self.streaming);
        let cancel = self.shutdown_token.clone();
        let handle = tokio::spawn(async move {
            let result = streaming.run(cancel).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Streaming task stopped");
            }
            result
        });

        let mut task = self.stream_task.lock();
        if task.is_some() {
            handle.abort();
            return Err(SessionError::AlreadyConnected);
        }
        *task = Some(handle);
        drop(task);

        tracing::info!(
            venue = %self.config.venue,
            instruments = loaded,
            live = self.config.live,
            "Venue session started"
        );
        Ok(())
    }

    async fn submit(&self, intent: OrderIntent) -> Result<BrokerOrderRef, ExecutionError> {
        self.execution.submit(intent).await
    }

    async fn cancel(&self, order: &BrokerOrderRef) -> Result<(), ExecutionError> {
        self.execution.cancel(order).await
    }

    async fn reconcile(&self) -> Result<ReconciliationReport, ReconciliationError> {
        let status = self.monitor.status();
        if !status.state.is_streaming() {
            return Err(ReconciliationError::InvalidState(status.state));
        }

        let gated = self.monitor.begin_reconciliation();
        let result = self.reconciler.reconcile().await;
        if gated {
            self.monitor.finish_reconciliation();
        }
        result
    }

    fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    async fn shutdown(&self) {
        if let Some(change) = self.monitor.close() {
            if let Err(e) = self.bus.publish(AdapterEvent::ConnectionStateChange(change)).await {
                tracing::warn!(error = %e, "Failed to publish shutdown state change");
            }
        }
        self.shutdown_token.cancel();

        let handle = self.stream_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Streaming task did not exit cleanly");
            }
        }
        tracing::info!(venue = %self.config.venue, "Venue session closed");
    }
}
