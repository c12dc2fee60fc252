//! Streaming Data Client
//!
//! Drives the pricing stream through the connection state machine:
//!
//! ```text
//! Disconnected → Connecting → Streaming
//!                    ↑  ↓         ↓ (I/O error, stall, venue close)
//!                    └─ Degraded ←┘
//! ```
//!
//! Each transition into `Streaming` raises the reconciliation flag, runs a
//! full reconciliation, and only then starts publishing quotes. Nothing is
//! buffered across a disconnect. Bad messages are dropped and counted; only
//! transport failures take the connection down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AccountStatePort, EventBusPort, PriceStream, PricingStreamPort, RawPrice, StreamMessage,
};
use crate::domain::connection::{ConnectionState, InvalidTransition};
use crate::domain::events::AdapterEvent;
use crate::domain::instrument::{CodecError, decode_price};
use crate::domain::market_data::PriceQuote;
use crate::domain::shared::{InstrumentId, TimestampError, UnixNanos};
use crate::resilience::{BackoffConfig, BackoffPolicy};

use super::connection_monitor::ConnectionMonitor;
use super::instrument_catalog::InstrumentCatalog;
use super::reconciliation::ReconciliationEngine;

// ============================================================================
// Configuration
// ============================================================================

/// Streaming client configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Instruments to subscribe.
    pub instruments: Vec<InstrumentId>,
    /// Longest wait for the stream to open.
    pub handshake_timeout: Duration,
    /// Longest silence (no price, no heartbeat) before the stream is dropped.
    pub stall_timeout: Duration,
    /// Reconnect schedule.
    pub backoff: BackoffConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            handshake_timeout: Duration::from_secs(10),
            stall_timeout: Duration::from_secs(20),
            backoff: BackoffConfig::default(),
        }
    }
}

// ============================================================================
// Errors and statistics
// ============================================================================

/// Streaming loop errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Backoff gave up.
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Consecutive failed attempts.
        attempts: u32,
    },

    /// State machine refused a transition.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

#[derive(Debug, thiserror::Error)]
enum QuoteError {
    #[error("unknown instrument {0}")]
    UnknownInstrument(InstrumentId),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}

/// Stream counters, mirrored into `metrics`.
#[derive(Debug, Default)]
pub struct StreamStats {
    received: AtomicU64,
    published: AtomicU64,
    heartbeats: AtomicU64,
    bad_messages: AtomicU64,
    unknown_instrument: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StreamStatsSnapshot {
    /// Messages read from the stream.
    pub received: u64,
    /// Quotes published.
    pub published: u64,
    /// Heartbeats seen.
    pub heartbeats: u64,
    /// Messages dropped as malformed or off-precision.
    pub bad_messages: u64,
    /// Prices for instruments outside the catalog.
    pub unknown_instrument: u64,
    /// Reconnects scheduled.
    pub reconnects: u64,
}

impl StreamStats {
    /// Copy the counters.
    #[must_use]
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            bad_messages: self.bad_messages.load(Ordering::Relaxed),
            unknown_instrument: self.unknown_instrument.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("oanda_adapter_stream_messages_total").increment(1);
    }

    fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("oanda_adapter_quotes_published_total").increment(1);
    }

    fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    fn record_bad(&self, reason: &'static str) {
        self.bad_messages.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("oanda_adapter_bad_messages_total", "reason" => reason).increment(1);
    }

    fn record_unknown_instrument(&self) {
        self.unknown_instrument.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("oanda_adapter_unknown_instrument_total").increment(1);
    }

    fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("oanda_adapter_reconnects_total").increment(1);
    }
}

enum SessionEnd {
    Cancelled,
    Failed(String),
}

// ============================================================================
// Client
// ============================================================================

/// Pricing stream driver.
pub struct StreamingClient<S, A, E>
where
    S: PricingStreamPort,
    A: AccountStatePort,
    E: EventBusPort,
{
    source: Arc<S>,
    bus: Arc<E>,
    catalog: Arc<InstrumentCatalog>,
    monitor: Arc<ConnectionMonitor>,
    reconciler: Arc<ReconciliationEngine<A, E>>,
    stats: Arc<StreamStats>,
    config: StreamingConfig,
}

impl<S, A, E> StreamingClient<S, A, E>
where
    S: PricingStreamPort,
    A: AccountStatePort,
    E: EventBusPort,
{
    /// Create a streaming client over shared session state.
    pub fn new(
        source: Arc<S>,
        bus: Arc<E>,
        catalog: Arc<InstrumentCatalog>,
        monitor: Arc<ConnectionMonitor>,
        reconciler: Arc<ReconciliationEngine<A, E>>,
        config: StreamingConfig,
    ) -> Self {
        Self {
            source,
            bus,
            catalog,
            monitor,
            reconciler,
            stats: Arc::new(StreamStats::default()),
            config,
        }
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// Run until cancelled, closed, or the backoff gives up.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), StreamError> {
        let mut backoff = BackoffPolicy::new(self.config.backoff.clone());

        loop {
            if cancel.is_cancelled() || !self.enter(ConnectionState::Connecting).await? {
                return Ok(());
            }

            let reason = match self.session(&cancel, &mut backoff).await {
                SessionEnd::Cancelled => return Ok(()),
                SessionEnd::Failed(reason) => reason,
            };

            if !self.enter(ConnectionState::Degraded).await? {
                return Ok(());
            }

            let attempts = backoff.attempt_count();
            let Some(delay) = backoff.next_delay() else {
                tracing::error!(attempts, reason = %reason, "Reconnect attempts exhausted");
                return Err(StreamError::ReconnectExhausted { attempts });
            };
            self.stats.record_reconnect();
            tracing::warn!(
                reason = %reason,
                attempt = backoff.attempt_count(),
                delay_ms = delay.as_millis(),
                "Stream degraded, reconnecting after backoff"
            );

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Open the stream, reconcile, then pump messages until failure.
    async fn session(&self, cancel: &CancellationToken, backoff: &mut BackoffPolicy) -> SessionEnd {
        let opened = tokio::select! {
            () = cancel.cancelled() => return SessionEnd::Cancelled,
            opened = tokio::time::timeout(
                self.config.handshake_timeout,
                self.source.open_stream(&self.config.instruments),
            ) => opened,
        };

        let stream = match opened {
            Err(_) => {
                return SessionEnd::Failed(format!(
                    "handshake timed out after {:?}",
                    self.config.handshake_timeout
                ));
            }
            Ok(Err(e)) => return SessionEnd::Failed(format!("handshake failed: {e}")),
            Ok(Ok(stream)) => stream,
        };

        match self.enter(ConnectionState::Streaming).await {
            Ok(true) => {}
            Ok(false) => return SessionEnd::Cancelled,
            Err(e) => return SessionEnd::Failed(e.to_string()),
        }

        if let Some(end) = self.reconcile(cancel).await {
            return end;
        }
        backoff.reset();

        self.pump(stream, cancel).await
    }

    /// Reconcile, then lower the gate that entering `Streaming` raised.
    /// `None` when quotes may flow.
    async fn reconcile(&self, cancel: &CancellationToken) -> Option<SessionEnd> {
        let result = tokio::select! {
            () = cancel.cancelled() => None,
            result = self.reconciler.reconcile() => Some(result),
        };
        self.monitor.finish_reconciliation();

        match result {
            None => Some(SessionEnd::Cancelled),
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Reconciliation failed, dropping connection");
                Some(SessionEnd::Failed(format!("reconciliation failed: {e}")))
            }
        }
    }

    async fn pump(&self, mut stream: PriceStream, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return SessionEnd::Cancelled,
                next = tokio::time::timeout(self.config.stall_timeout, stream.next()) => next,
            };

            match next {
                Err(_) => {
                    return SessionEnd::Failed(format!(
                        "no message or heartbeat within {:?}",
                        self.config.stall_timeout
                    ));
                }
                Ok(None) => return SessionEnd::Failed("stream closed by venue".to_string()),
                Ok(Some(Err(e))) => return SessionEnd::Failed(format!("stream error: {e}")),
                Ok(Some(Ok(message))) => self.handle_message(message).await,
            }
        }
    }

    async fn handle_message(&self, message: StreamMessage) {
        self.stats.record_received();
        match message {
            StreamMessage::Heartbeat { time } => {
                self.stats.record_heartbeat();
                tracing::debug!(time = %time, "Heartbeat");
            }
            StreamMessage::Malformed { reason } => {
                self.stats.record_bad("malformed");
                tracing::warn!(reason = %reason, "Dropping malformed stream message");
            }
            StreamMessage::Price(raw) => match self.decode_quote(&raw) {
                Ok(quote) => {
                    tracing::debug!(
                        instrument = %quote.instrument,
                        bid = %quote.bid,
                        ask = %quote.ask,
                        "Quote"
                    );
                    match self.bus.publish(AdapterEvent::QuoteUpdate(quote)).await {
                        Ok(()) => self.stats.record_published(),
                        Err(e) => tracing::warn!(error = %e, "Failed to publish quote"),
                    }
                }
                Err(QuoteError::UnknownInstrument(instrument)) => {
                    self.stats.record_unknown_instrument();
                    tracing::warn!(
                        instrument = %instrument,
                        "Dropping price for unknown instrument"
                    );
                }
                Err(e @ QuoteError::Codec(CodecError::PrecisionMismatch { .. })) => {
                    self.stats.record_bad("precision");
                    tracing::warn!(
                        instrument = %raw.instrument,
                        error = %e,
                        "Dropping off-precision price"
                    );
                }
                Err(e @ QuoteError::Codec(_)) => {
                    self.stats.record_bad("malformed");
                    tracing::warn!(
                        instrument = %raw.instrument,
                        error = %e,
                        "Dropping malformed price"
                    );
                }
                Err(e @ QuoteError::Timestamp(_)) => {
                    self.stats.record_bad("timestamp");
                    tracing::warn!(
                        instrument = %raw.instrument,
                        error = %e,
                        "Dropping price with bad timestamp"
                    );
                }
            },
        }
    }

    fn decode_quote(&self, raw: &RawPrice) -> Result<PriceQuote, QuoteError> {
        let instrument = self
            .catalog
            .lookup(&raw.instrument)
            .map_err(|_| QuoteError::UnknownInstrument(raw.instrument.clone()))?;

        Ok(PriceQuote {
            instrument: instrument.id.clone(),
            bid: decode_price(&raw.bid, &instrument)?,
            ask: decode_price(&raw.ask, &instrument)?,
            ts_event: UnixNanos::parse_rfc3339(&raw.time)?,
            ts_init: UnixNanos::now(),
        })
    }

    /// Transition and publish the change. `Ok(false)` once closed.
    async fn enter(&self, to: ConnectionState) -> Result<bool, StreamError> {
        if self.monitor.state().is_terminal() {
            return Ok(false);
        }
        let change = match self.monitor.transition(to) {
            Ok(change) => change,
            // Shutdown may close the monitor between the check and the write.
            Err(_) if self.monitor.state().is_terminal() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = self.bus.publish(AdapterEvent::ConnectionStateChange(change)).await {
            tracing::warn!(error = %e, "Failed to publish connection state change");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        EventPublishError, InstrumentMetadata, MockAccountStatePort, VenueError,
    };
    use crate::application::services::{OrderRegistry, PositionBook};
    use crate::domain::connection::ConnectionState::{Connecting, Degraded, Streaming};
    use async_trait::async_trait;
    use futures::stream;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingBus(Mutex<Vec<AdapterEvent>>);

    #[async_trait]
    impl EventBusPort for RecordingBus {
        async fn publish(&self, event: AdapterEvent) -> Result<(), EventPublishError> {
            self.0.lock().push(event);
            Ok(())
        }
    }

    impl RecordingBus {
        fn quotes(&self) -> Vec<PriceQuote> {
            self.0
                .lock()
                .iter()
                .filter_map(|e| match e {
                    AdapterEvent::QuoteUpdate(q) => Some(q.clone()),
                    _ => None,
                })
                .collect()
        }

        fn states(&self) -> Vec<ConnectionState> {
            self.0
                .lock()
                .iter()
                .filter_map(|e| match e {
                    AdapterEvent::ConnectionStateChange(c) => Some(c.to),
                    _ => None,
                })
                .collect()
        }
    }

    /// Hands out scripted sessions; once exhausted, every open fails.
    struct ScriptedSource {
        sessions: Mutex<VecDeque<Result<Vec<Result<StreamMessage, VenueError>>, VenueError>>>,
    }

    #[async_trait]
    impl PricingStreamPort for ScriptedSource {
        async fn open_stream(
            &self,
            _instruments: &[InstrumentId],
        ) -> Result<PriceStream, VenueError> {
            let next = self.sessions.lock().pop_front();
            match next {
                Some(Ok(messages)) => Ok(stream::iter(messages).boxed()),
                Some(Err(e)) => Err(e),
                None => Err(VenueError::transport("no more sessions")),
            }
        }
    }

    fn price(instrument: &str, bid: &str, ask: &str) -> Result<StreamMessage, VenueError> {
        Ok(StreamMessage::Price(RawPrice {
            instrument: InstrumentId::new(instrument),
            bid: bid.to_string(),
            ask: ask.to_string(),
            time: "2024-01-02T10:00:00.000000001Z".to_string(),
        }))
    }

    fn config(max_attempts: u32) -> StreamingConfig {
        StreamingConfig {
            instruments: vec![InstrumentId::new("EUR/USD")],
            backoff: BackoffConfig {
                max_attempts,
                ..BackoffConfig::default().without_jitter()
            },
            ..StreamingConfig::default()
        }
    }

    fn build<S: PricingStreamPort>(
        source: S,
        config: StreamingConfig,
    ) -> (
        StreamingClient<S, MockAccountStatePort, RecordingBus>,
        Arc<RecordingBus>,
        Arc<ConnectionMonitor>,
    ) {
        let bus = Arc::new(RecordingBus::default());
        let monitor = Arc::new(ConnectionMonitor::new());
        let client = client_over(source, Arc::clone(&bus), Arc::clone(&monitor), config);
        (client, bus, monitor)
    }

    fn client_over<S: PricingStreamPort, E: EventBusPort>(
        source: S,
        bus: Arc<E>,
        monitor: Arc<ConnectionMonitor>,
        config: StreamingConfig,
    ) -> StreamingClient<S, MockAccountStatePort, E> {
        let catalog = Arc::new(InstrumentCatalog::new());
        catalog
            .load_static(vec![InstrumentMetadata {
                symbol: InstrumentId::new("EUR/USD"),
                display_name: None,
                display_precision: 5,
                trade_units_precision: 0,
                minimum_trade_size: "1".to_string(),
            }])
            .unwrap();

        let mut account = MockAccountStatePort::new();
        account.expect_open_positions().returning(|| Ok(vec![]));
        account.expect_open_orders().returning(|| Ok(vec![]));

        let reconciler = Arc::new(ReconciliationEngine::new(
            Arc::new(account),
            Arc::new(OrderRegistry::new()),
            Arc::new(PositionBook::new()),
            Arc::clone(&bus),
        ));
        StreamingClient::new(Arc::new(source), bus, catalog, monitor, reconciler, config)
    }

    fn scripted(
        sessions: Vec<Result<Vec<Result<StreamMessage, VenueError>>, VenueError>>,
        max_attempts: u32,
    ) -> (
        StreamingClient<ScriptedSource, MockAccountStatePort, RecordingBus>,
        Arc<RecordingBus>,
        Arc<ConnectionMonitor>,
    ) {
        let source = ScriptedSource {
            sessions: Mutex::new(sessions.into()),
        };
        build(source, config(max_attempts))
    }

    #[tokio::test(start_paused = true)]
    async fn bad_messages_are_dropped_and_counted() {
        let (client, bus, _) = scripted(
            vec![Ok(vec![
                price("EUR/USD", "1.10000", "1.10002"),
                Ok(StreamMessage::Malformed {
                    reason: "not json".into(),
                }),
                price("EUR/USD", "1.123456", "1.10002"),
                price("GBP/USD", "1.25000", "1.25002"),
                Ok(StreamMessage::Heartbeat {
                    time: "2024-01-02T10:00:05Z".into(),
                }),
                price("EUR/USD", "1.10001", "1.10003"),
            ])],
            1,
        );

        let err = client.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, StreamError::ReconnectExhausted { attempts: 1 });

        let quotes = bus.quotes();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].bid.to_string(), "1.10000");
        assert_eq!(quotes[1].ask.to_string(), "1.10003");
        assert_eq!(quotes[0].ts_event.as_i64(), 1_704_189_600_000_000_001);

        let stats = client.stats().snapshot();
        assert_eq!(stats.received, 6);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.bad_messages, 2);
        assert_eq!(stats.unknown_instrument, 1);
        assert_eq!(stats.heartbeats, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn degrades_and_reconnects_after_stream_ends() {
        let (client, bus, monitor) = scripted(
            vec![
                Ok(vec![price("EUR/USD", "1.10000", "1.10002")]),
                Err(VenueError::transport("refused")),
                Ok(vec![price("EUR/USD", "1.10001", "1.10003")]),
            ],
            3,
        );

        let err = client.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, StreamError::ReconnectExhausted { attempts: 3 });
        assert_eq!(bus.quotes().len(), 2);
        assert_eq!(monitor.state(), ConnectionState::Degraded);

        assert_eq!(
            bus.states()[..6],
            [Connecting, Streaming, Degraded, Connecting, Degraded, Connecting]
        );
        // Backoff resets after the second successful session.
        assert_eq!(client.stats().snapshot().reconnects, 5);
    }

    /// Records whether orders were accepted when each `Streaming` change landed.
    struct GateWatchBus {
        monitor: Arc<ConnectionMonitor>,
        gate_on_streaming: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl EventBusPort for GateWatchBus {
        async fn publish(&self, event: AdapterEvent) -> Result<(), EventPublishError> {
            if matches!(&event, AdapterEvent::ConnectionStateChange(c) if c.to == Streaming) {
                self.gate_on_streaming
                    .lock()
                    .push(self.monitor.accepts_orders());
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn orders_stay_gated_until_reconciliation_finishes() {
        let monitor = Arc::new(ConnectionMonitor::new());
        let bus = Arc::new(GateWatchBus {
            monitor: Arc::clone(&monitor),
            gate_on_streaming: Mutex::new(Vec::new()),
        });
        let source = ScriptedSource {
            sessions: Mutex::new(
                vec![
                    Ok(vec![price("EUR/USD", "1.10000", "1.10002")]),
                    Ok(vec![price("EUR/USD", "1.10001", "1.10003")]),
                ]
                .into(),
            ),
        };
        let client = client_over(source, Arc::clone(&bus), Arc::clone(&monitor), config(2));

        let err = client.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, StreamError::ReconnectExhausted { .. }));
        assert_eq!(*bus.gate_on_streaming.lock(), vec![false, false]);
        assert_eq!(client.stats().snapshot().published, 2);
    }

    /// First stream opens and never yields; later opens fail.
    #[derive(Default)]
    struct Silent {
        opened: AtomicBool,
    }

    #[async_trait]
    impl PricingStreamPort for Silent {
        async fn open_stream(&self, _: &[InstrumentId]) -> Result<PriceStream, VenueError> {
            if self.opened.swap(true, Ordering::SeqCst) {
                Err(VenueError::transport("refused"))
            } else {
                Ok(stream::pending().boxed())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_is_dropped() {
        let (client, bus, _) = build(Silent::default(), config(1));

        let started = tokio::time::Instant::now();
        let err = client.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, StreamError::ReconnectExhausted { .. }));
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(bus.states().contains(&Degraded));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let (client, _, monitor) = scripted(vec![Ok(vec![])], 0);
        let client = Arc::new(client);
        let cancel = CancellationToken::new();

        let task = {
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            tokio::spawn(async move { client.run(cancel).await })
        };

        monitor
            .wait_for_state(ConnectionState::Degraded, Duration::from_secs(5))
            .await
            .unwrap();
        monitor.close();
        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(monitor.state(), ConnectionState::Closed);
    }
}
