//! Prometheus Metrics Module
//!
//! Installs the Prometheus recorder behind the `metrics` facade. The
//! services record through `metrics::counter!`/`gauge!`/`histogram!` at the
//! point of the event; this module only installs the recorder and describes
//! the series.
//!
//! # Series
//!
//! - **Stream**: messages received, quotes published, bad messages by
//!   reason, unknown instruments, reconnects
//! - **Orders**: submissions by outcome, rate limiter waits
//! - **Reconciliation**: position divergences, unreconciled orders
//! - **Connection**: current state as a gauge
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Idempotent: later calls return the handle installed by the first.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Handle for rendering, if the recorder is installed.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn describe_metrics() {
    // Stream
    describe_counter!(
        "oanda_adapter_stream_messages_total",
        "Messages received on the pricing stream"
    );
    describe_counter!(
        "oanda_adapter_quotes_published_total",
        "Quotes published to the bus"
    );
    describe_counter!(
        "oanda_adapter_bad_messages_total",
        "Stream messages dropped, by reason"
    );
    describe_counter!(
        "oanda_adapter_unknown_instrument_total",
        "Prices for instruments missing from the catalog"
    );
    describe_counter!(
        "oanda_adapter_reconnects_total",
        "Pricing stream reconnection attempts"
    );

    // Orders
    describe_counter!(
        "oanda_adapter_orders_submitted_total",
        "Order submissions, by outcome"
    );
    describe_histogram!(
        "oanda_adapter_rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate limiter token"
    );

    // Reconciliation
    describe_counter!(
        "oanda_adapter_position_divergences_total",
        "Local positions overwritten with the venue's"
    );
    describe_counter!(
        "oanda_adapter_unreconciled_orders_total",
        "Open venue orders with no local intent"
    );

    // Connection
    describe_gauge!(
        "oanda_adapter_connection_state",
        "Streaming connection state (0 disconnected, 1 connecting, 2 streaming, 3 degraded, 4 closed)"
    );
}
