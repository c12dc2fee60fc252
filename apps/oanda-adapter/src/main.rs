//! OANDA Adapter Binary
//!
//! Connects to OANDA, streams prices onto the event bus, and serves health
//! and metrics until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin oanda-adapter
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `OANDA_ACCESS_TOKEN`: v20 personal access token
//! - `OANDA_ACCOUNT_ID`: v20 account identifier
//!
//! ## Optional
//! - `OANDA_ENVIRONMENT`: PRACTICE | LIVE (default: PRACTICE)
//! - `OANDA_INSTRUMENTS`: Comma-separated symbols, `EUR/USD` or `EUR_USD` (default: EUR/USD)
//! - `OANDA_ORDER_RATE_CAPACITY` / `OANDA_ORDER_RATE_PER_SEC`: Order bucket (default: 5 / 5.0)
//! - `OANDA_ORDER_RATE_TIMEOUT_MS`: Max wait for an order token (default: 5000)
//! - `OANDA_API_RATE_CAPACITY` / `OANDA_API_RATE_PER_SEC`: Read bucket (default: 100 / 100.0)
//! - `OANDA_HTTP_TIMEOUT_SECS`: REST request timeout (default: 10)
//! - `OANDA_HANDSHAKE_TIMEOUT_SECS` / `OANDA_STALL_TIMEOUT_SECS`: Stream timeouts (default: 10 / 20)
//! - `OANDA_RECONNECT_*`: Reconnect backoff tuning
//! - `OANDA_STATIC_INSTRUMENTS`: JSON file of instrument definitions
//! - `HEALTH_PORT`: Health and metrics HTTP port (default: 8083)
//! - `BUS_CAPACITY`: Event bus buffer size (default: 10000)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use oanda_adapter::infrastructure::health::{HealthServer, HealthServerState};
use oanda_adapter::infrastructure::telemetry;
use oanda_adapter::{
    AdapterConfig, AdapterEvent, BroadcastEventBus, OandaAdapter, VenueAdapter, VenueSession,
    init_metrics,
};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting OANDA adapter");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
    }

    let config = AdapterConfig::from_env().context("invalid adapter configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let venue = Arc::new(
        OandaAdapter::new(&config.oanda_config(), config.instruments.clone())
            .context("failed to build OANDA client")?,
    );
    let bus = Arc::new(BroadcastEventBus::new(config.server.bus_capacity));
    let session = Arc::new(VenueSession::new(
        venue,
        Arc::clone(&bus),
        config.session_config(),
    ));

    // Log bus traffic until shutdown
    let events = bus.subscribe();
    let logger_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        log_events(events, logger_shutdown).await;
    });

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(session.monitor()),
        session.stream_stats(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    if let Err(e) = session.connect().await {
        shutdown_token.cancel();
        return Err(e).context("failed to start venue session");
    }

    tracing::info!("OANDA adapter ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, session.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Session shutdown timed out"
        );
    }

    tracing::info!(
        published = bus.published(),
        unobserved = bus.unobserved(),
        "OANDA adapter stopped"
    );
    Ok(())
}

/// Log adapter events published on the bus.
async fn log_events(
    mut events: broadcast::Receiver<AdapterEvent>,
    shutdown_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown_token.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(AdapterEvent::QuoteUpdate(quote)) => {
                tracing::trace!(instrument = %quote.instrument, "Quote");
            }
            Ok(AdapterEvent::OrderStatusUpdate(update)) => {
                tracing::info!(
                    order_id = %update.order_id,
                    status = ?update.status,
                    reason = ?update.reason,
                    "Order status"
                );
            }
            Ok(AdapterEvent::PositionDivergence(divergence)) => {
                tracing::warn!(
                    instrument = %divergence.instrument,
                    delta = %divergence.quantity_delta(),
                    "Position divergence"
                );
            }
            Ok(AdapterEvent::UnreconciledOrder(order)) => {
                tracing::warn!(
                    broker_order_id = %order.broker_order_id,
                    instrument = %order.instrument,
                    reason = %order.reason,
                    "Unreconciled venue order"
                );
            }
            Ok(AdapterEvent::ConnectionStateChange(change)) => {
                tracing::info!(from = %change.from, to = %change.to, "Connection state");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &AdapterConfig) {
    tracing::info!(
        environment = %config.environment,
        account_id = config.credentials.account_id(),
        instruments = config.instruments.len(),
        health_port = config.server.health_port,
        static_instruments = config.static_instruments.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        api_base_url = config.environment.api_base_url(),
        stream_base_url = config.environment.stream_base_url(),
        "OANDA endpoints"
    );
    if config.environment.is_live() {
        tracing::warn!("LIVE environment: orders move real money");
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
