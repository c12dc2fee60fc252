//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, and
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status with stream counters
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe: ready only while streaming and not
//!   reconciling, i.e. exactly when orders are accepted
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{
    ConnectionMonitor, ConnectionStatus, StreamStats, StreamStatsSnapshot,
};
use crate::domain::connection::ConnectionState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Adapter version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Venue connection.
    pub connection: ConnectionInfo,
    /// Pricing stream counters.
    pub stream: StreamStatsSnapshot,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Streaming and accepting orders.
    Healthy,
    /// Connecting, reconnecting or reconciling.
    Degraded,
    /// Not connected or shut down.
    Unhealthy,
}

/// Connection section of the health response.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Reconciliation in progress.
    pub reconciling: bool,
    /// Whether order submission is currently allowed.
    pub accepts_orders: bool,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    monitor: Arc<ConnectionMonitor>,
    stream_stats: Arc<StreamStats>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        monitor: Arc<ConnectionMonitor>,
        stream_stats: Arc<StreamStats>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            monitor,
            stream_stats,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by [`HealthServer`].
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.monitor.accepts_orders() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection = state.monitor.status();

    HealthResponse {
        status: determine_health_status(connection),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection: ConnectionInfo {
            state: connection.state,
            reconciling: connection.reconciling,
            accepts_orders: connection.accepts_orders(),
        },
        stream: state.stream_stats.snapshot(),
    }
}

const fn determine_health_status(status: ConnectionStatus) -> HealthStatus {
    match status.state {
        ConnectionState::Streaming if !status.reconciling => HealthStatus::Healthy,
        ConnectionState::Streaming | ConnectionState::Connecting | ConnectionState::Degraded => {
            HealthStatus::Degraded
        }
        ConnectionState::Disconnected | ConnectionState::Closed => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(monitor: &Arc<ConnectionMonitor>) -> Arc<HealthServerState> {
        Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            Arc::clone(monitor),
            Arc::new(StreamStats::default()),
        ))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    fn streaming_monitor() -> Arc<ConnectionMonitor> {
        let monitor = Arc::new(ConnectionMonitor::new());
        monitor.transition(ConnectionState::Connecting).unwrap();
        monitor.transition(ConnectionState::Streaming).unwrap();
        monitor.finish_reconciliation();
        monitor
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_connection() {
        let status = |state, reconciling| {
            determine_health_status(ConnectionStatus { state, reconciling })
        };
        assert_eq!(status(ConnectionState::Streaming, false), HealthStatus::Healthy);
        assert_eq!(status(ConnectionState::Streaming, true), HealthStatus::Degraded);
        assert_eq!(status(ConnectionState::Degraded, false), HealthStatus::Degraded);
        assert_eq!(status(ConnectionState::Closed, false), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let monitor = Arc::new(ConnectionMonitor::new());
        assert_eq!(get_status(router(state(&monitor)), "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_tracks_order_gate() {
        let monitor = Arc::new(ConnectionMonitor::new());
        assert_eq!(
            get_status(router(state(&monitor)), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        let monitor = streaming_monitor();
        assert_eq!(get_status(router(state(&monitor)), "/readyz").await, StatusCode::OK);

        assert!(monitor.begin_reconciliation());
        assert_eq!(
            get_status(router(state(&monitor)), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn health_reports_connection_and_stream() {
        let monitor = streaming_monitor();
        let response = router(state(&monitor))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["connection"]["state"], "STREAMING");
        assert_eq!(json["connection"]["accepts_orders"], true);
        assert_eq!(json["stream"]["received"], 0);
    }
}
