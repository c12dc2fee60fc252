//! Execution Client
//!
//! Order submission and cancellation against the venue. Every call is gated
//! on the connection (streaming and not reconciling), encoded through the
//! instrument's codec, admitted by the order rate limiter, and retried at
//! most once after a transport failure. A second failure is reported as
//! [`ExecutionError::SubmissionUncertain`]; nothing is resent blindly, and the
//! next reconciliation settles what actually happened.

use std::future::Future;
use std::sync::Arc;

use crate::application::ports::{
    CancelTarget, EventBusPort, OrderGatewayPort, OrderSubmission, VenueError,
};
use crate::domain::connection::ConnectionState;
use crate::domain::events::{AdapterEvent, OrderStatusUpdate};
use crate::domain::instrument::{CodecError, align_size, encode_price, encode_size};
use crate::domain::order_execution::{BrokerOrderRef, OrderIntent, OrderStatus};
use crate::domain::shared::{CorrelationTag, InstrumentId, OrderId, UnixNanos};
use crate::resilience::{RateLimitError, RateLimiter};

use super::connection_monitor::ConnectionMonitor;
use super::instrument_catalog::{CatalogError, InstrumentCatalog};
use super::order_registry::{OrderRegistry, RegistryError};

/// Execution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// Connection is not streaming, or reconciliation is running.
    #[error("not connected (state {state}, reconciling {reconciling})")]
    NotConnected {
        /// Connection state at the time of the call.
        state: ConnectionState,
        /// Whether reconciliation was running.
        reconciling: bool,
    },

    /// No rate-limit token in time; nothing was sent.
    #[error("rate limit: {0}")]
    RateLimitTimeout(#[from] RateLimitError),

    /// Request may or may not have reached the venue.
    #[error("submission uncertain for {order_id}: {reason}")]
    SubmissionUncertain {
        /// Engine-issued id.
        order_id: OrderId,
        /// What failed.
        reason: String,
    },

    /// Intent reuses a tag already in flight.
    #[error("correlation tag collision: {0}")]
    CorrelationCollision(CorrelationTag),

    /// Instrument not in the catalog.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    /// Intent fails validation.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Price or size not representable for the instrument.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Venue refused the request.
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),
}

enum CallFailure {
    Limited(RateLimitError),
    Venue(VenueError),
    Uncertain(String),
}

/// Venue order entry with correlation tags.
pub struct ExecutionClient<G, E>
where
    G: OrderGatewayPort,
    E: EventBusPort,
{
    gateway: Arc<G>,
    bus: Arc<E>,
    catalog: Arc<InstrumentCatalog>,
    registry: Arc<OrderRegistry>,
    monitor: Arc<ConnectionMonitor>,
    limiter: Arc<RateLimiter>,
    live: bool,
}

impl<G, E> ExecutionClient<G, E>
where
    G: OrderGatewayPort,
    E: EventBusPort,
{
    /// Create an execution client over shared session state.
    pub fn new(
        gateway: Arc<G>,
        bus: Arc<E>,
        catalog: Arc<InstrumentCatalog>,
        registry: Arc<OrderRegistry>,
        monitor: Arc<ConnectionMonitor>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            gateway,
            bus,
            catalog,
            registry,
            monitor,
            limiter,
            live: false,
        }
    }

    /// Flag the session as trading real money; every submission is logged.
    #[must_use]
    pub const fn with_live_trading(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Submit an intent.
    pub async fn submit(&self, intent: OrderIntent) -> Result<BrokerOrderRef, ExecutionError> {
        self.ensure_connected()?;
        intent
            .validate()
            .map_err(|e| ExecutionError::InvalidOrder(e.to_string()))?;

        let submission = self.encode(&intent)?;
        let order_ref = self.registry.register(&intent).map_err(|e| match e {
            RegistryError::CorrelationCollision(tag) => ExecutionError::CorrelationCollision(tag),
            RegistryError::InvalidTag(tag) => {
                ExecutionError::InvalidOrder(format!("correlation tag '{tag}' not accepted"))
            }
        })?;
        let tag = order_ref.correlation_tag.clone();

        if self.live {
            tracing::warn!(
                order_id = %intent.order_id,
                instrument = %intent.instrument,
                side = %intent.side,
                quantity = %submission.quantity,
                "Submitting order to LIVE account"
            );
        }
        tracing::info!(
            order_id = %intent.order_id,
            instrument = %intent.instrument,
            side = %intent.side,
            order_type = %intent.order_type,
            quantity = %submission.quantity,
            price = submission.price.as_deref().unwrap_or("-"),
            "Submitting order"
        );

        let gateway = &*self.gateway;
        let submission = &submission;
        match self
            .call_with_retry("submit", move || gateway.submit_order(submission))
            .await
        {
            Ok(ack) => {
                let order_ref = self
                    .registry
                    .record_ack(&tag, ack.broker_order_id.clone(), ack.status)
                    .unwrap_or_else(|| order_ref.with_broker_id(ack.broker_order_id.clone()));
                tracing::info!(
                    order_id = %order_ref.order_id,
                    broker_order_id = %ack.broker_order_id,
                    status = %ack.status,
                    "Order acknowledged"
                );
                metrics::counter!("oanda_adapter_orders_submitted_total", "outcome" => "accepted")
                    .increment(1);
                self.publish_status(&order_ref, ack.status, ack.reason).await;
                Ok(order_ref)
            }
            Err(CallFailure::Limited(e)) => {
                self.registry.forget(&tag);
                metrics::counter!(
                    "oanda_adapter_orders_submitted_total",
                    "outcome" => "rate_limited"
                )
                .increment(1);
                Err(ExecutionError::RateLimitTimeout(e))
            }
            Err(CallFailure::Venue(e)) => {
                self.registry.set_status(&tag, OrderStatus::Rejected);
                tracing::warn!(order_id = %order_ref.order_id, error = %e, "Order rejected");
                metrics::counter!("oanda_adapter_orders_submitted_total", "outcome" => "rejected")
                    .increment(1);
                self.publish_status(&order_ref, OrderStatus::Rejected, Some(e.to_string()))
                    .await;
                Err(ExecutionError::Venue(e))
            }
            Err(CallFailure::Uncertain(reason)) => {
                self.registry.set_status(&tag, OrderStatus::Uncertain);
                tracing::error!(
                    order_id = %order_ref.order_id,
                    reason = %reason,
                    "Submission uncertain, awaiting reconciliation"
                );
                metrics::counter!("oanda_adapter_orders_submitted_total", "outcome" => "uncertain")
                    .increment(1);
                self.publish_status(&order_ref, OrderStatus::Uncertain, Some(reason.clone()))
                    .await;
                Err(ExecutionError::SubmissionUncertain {
                    order_id: order_ref.order_id,
                    reason,
                })
            }
        }
    }

    /// Cancel an order by broker id when known, else by correlation tag.
    pub async fn cancel(&self, order_ref: &BrokerOrderRef) -> Result<(), ExecutionError> {
        self.ensure_connected()?;

        let target = order_ref.broker_order_id.clone().map_or_else(
            || CancelTarget::Tag(order_ref.correlation_tag.clone()),
            CancelTarget::Broker,
        );
        let tag = &order_ref.correlation_tag;
        let previous = self.registry.set_status(tag, OrderStatus::PendingCancel);
        tracing::info!(order_id = %order_ref.order_id, target = ?target, "Cancelling order");

        let gateway = &*self.gateway;
        let target = &target;
        match self
            .call_with_retry("cancel", move || gateway.cancel_order(target))
            .await
        {
            Ok(()) => {
                self.registry.set_status(tag, OrderStatus::Canceled);
                tracing::info!(order_id = %order_ref.order_id, "Order cancelled");
                self.publish_status(order_ref, OrderStatus::Canceled, None).await;
                Ok(())
            }
            Err(CallFailure::Limited(e)) => {
                self.restore_status(tag, previous);
                Err(ExecutionError::RateLimitTimeout(e))
            }
            Err(CallFailure::Venue(e)) => {
                self.restore_status(tag, previous);
                tracing::warn!(order_id = %order_ref.order_id, error = %e, "Cancel rejected");
                Err(ExecutionError::Venue(e))
            }
            Err(CallFailure::Uncertain(reason)) => {
                tracing::error!(
                    order_id = %order_ref.order_id,
                    reason = %reason,
                    "Cancel uncertain, awaiting reconciliation"
                );
                Err(ExecutionError::SubmissionUncertain {
                    order_id: order_ref.order_id.clone(),
                    reason,
                })
            }
        }
    }

    fn ensure_connected(&self) -> Result<(), ExecutionError> {
        let status = self.monitor.status();
        if status.accepts_orders() {
            Ok(())
        } else {
            Err(ExecutionError::NotConnected {
                state: status.state,
                reconciling: status.reconciling,
            })
        }
    }

    fn encode(&self, intent: &OrderIntent) -> Result<OrderSubmission, ExecutionError> {
        let instrument = self.catalog.lookup(&intent.instrument).map_err(|e| match e {
            CatalogError::NotFound(id) => ExecutionError::UnknownInstrument(id),
            other => ExecutionError::InvalidOrder(other.to_string()),
        })?;

        let quantity = align_size(intent.quantity, &instrument).value();
        if quantity.is_zero() || quantity < instrument.minimum_size {
            return Err(ExecutionError::InvalidOrder(format!(
                "quantity {} below minimum {} for {}",
                intent.quantity, instrument.minimum_size, instrument.id
            )));
        }

        let price = intent
            .price
            .map(|price| encode_price(price, &instrument))
            .transpose()?;

        Ok(OrderSubmission {
            correlation_tag: CorrelationTag::for_order(&intent.order_id),
            instrument: instrument.id.clone(),
            side: intent.side,
            order_type: intent.order_type,
            quantity: encode_size(quantity, &instrument)?,
            price,
            time_in_force: intent.time_in_force,
        })
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        mut call: F,
    ) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VenueError>>,
    {
        self.limiter.acquire().await.map_err(CallFailure::Limited)?;
        let first = match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transport() => e,
            Err(e) => return Err(CallFailure::Venue(e)),
        };

        tracing::warn!(op, error = %first, "Transport failure, retrying once");
        if !self.monitor.accepts_orders() {
            return Err(CallFailure::Uncertain(format!(
                "{first}; connection lost before retry"
            )));
        }
        if let Err(e) = self.limiter.acquire().await {
            return Err(CallFailure::Uncertain(format!("{first}; retry not sent: {e}")));
        }

        call()
            .await
            .map_err(|retry| CallFailure::Uncertain(format!("{first}; retry failed: {retry}")))
    }

    fn restore_status(&self, tag: &CorrelationTag, previous: Option<OrderStatus>) {
        if let Some(status) = previous {
            self.registry.set_status(tag, status);
        }
    }

    async fn publish_status(
        &self,
        order_ref: &BrokerOrderRef,
        status: OrderStatus,
        reason: Option<String>,
    ) {
        let event = AdapterEvent::OrderStatusUpdate(OrderStatusUpdate {
            order_id: order_ref.order_id.clone(),
            correlation_tag: order_ref.correlation_tag.clone(),
            broker_order_id: order_ref.broker_order_id.clone(),
            status,
            reason,
            ts: UnixNanos::now(),
        });
        if let Err(e) = self.bus.publish(event).await {
            tracing::warn!(
                order_id = %order_ref.order_id,
                error = %e,
                "Failed to publish order status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        EventPublishError, InstrumentMetadata, MockOrderGatewayPort, VenueOrderAck,
    };
    use crate::domain::order_execution::OrderSide;
    use crate::domain::shared::BrokerId;
    use crate::resilience::RateLimiterConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::time::Duration;

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
        fn statuses(&self) -> Vec<OrderStatus> {
            self.0
                .lock()
                .iter()
                .filter_map(|e| match e {
                    AdapterEvent::OrderStatusUpdate(u) => Some(u.status),
                    _ => None,
                })
                .collect()
        }
    }

    struct Fixture {
        client: ExecutionClient<MockOrderGatewayPort, RecordingBus>,
        bus: Arc<RecordingBus>,
        registry: Arc<OrderRegistry>,
        monitor: Arc<ConnectionMonitor>,
    }

    fn fixture(gateway: MockOrderGatewayPort) -> Fixture {
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

        let monitor = Arc::new(ConnectionMonitor::new());
        monitor.transition(ConnectionState::Connecting).unwrap();
        monitor.transition(ConnectionState::Streaming).unwrap();
        monitor.finish_reconciliation();

        let bus = Arc::new(RecordingBus::default());
        let registry = Arc::new(OrderRegistry::new());
        let limiter = Arc::new(RateLimiter::new(
            "orders",
            RateLimiterConfig::per_second(10, 10.0).with_timeout(Duration::from_secs(1)),
        ));
        let client = ExecutionClient::new(
            Arc::new(gateway),
            Arc::clone(&bus),
            catalog,
            Arc::clone(&registry),
            Arc::clone(&monitor),
            limiter,
        );
        Fixture {
            client,
            bus,
            registry,
            monitor,
        }
    }

    fn limit_buy(id: &str) -> OrderIntent {
        OrderIntent::limit(
            OrderId::new(id),
            InstrumentId::new("EUR/USD"),
            OrderSide::Buy,
            dec!(10000),
            dec!(1.10000),
        )
    }

    fn ack(id: &str) -> VenueOrderAck {
        VenueOrderAck {
            broker_order_id: BrokerId::new(id),
            status: OrderStatus::Accepted,
            reason: None,
        }
    }

    #[tokio::test]
    async fn submit_sends_encoded_order_with_tag() {
        let mut gateway = MockOrderGatewayPort::new();
        gateway
            .expect_submit_order()
            .withf(|order| {
                order.correlation_tag.as_str() == "ord-1"
                    && order.quantity == "10000"
                    && order.price.as_deref() == Some("1.10000")
            })
            .times(1)
            .returning(|_| Ok(ack("42")));
        let f = fixture(gateway);

        let order_ref = f.client.submit(limit_buy("ord-1")).await.unwrap();
        assert_eq!(order_ref.correlation_tag.as_str(), "ord-1");
        assert_eq!(order_ref.broker_order_id, Some(BrokerId::new("42")));
        assert_eq!(f.bus.statuses(), vec![OrderStatus::Accepted]);
    }

    #[tokio::test]
    async fn transport_failure_is_retried_once() {
        let mut gateway = MockOrderGatewayPort::new();
        let mut seq = mockall::Sequence::new();
        gateway
            .expect_submit_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(VenueError::transport("503")));
        gateway
            .expect_submit_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ack("42")));
        let f = fixture(gateway);

        assert!(f.client.submit(limit_buy("ord-1")).await.is_ok());
    }

    #[tokio::test]
    async fn second_transport_failure_is_uncertain() {
        let mut gateway = MockOrderGatewayPort::new();
        gateway
            .expect_submit_order()
            .times(2)
            .returning(|_| Err(VenueError::transport("timeout")));
        let f = fixture(gateway);

        let err = f.client.submit(limit_buy("ord-1")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::SubmissionUncertain { .. }));
        let tracked = f.registry.get(&CorrelationTag::new("ord-1")).unwrap();
        assert_eq!(tracked.status, OrderStatus::Uncertain);
        assert_eq!(f.bus.statuses(), vec![OrderStatus::Uncertain]);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let mut gateway = MockOrderGatewayPort::new();
        gateway.expect_submit_order().times(1).returning(|_| {
            Err(VenueError::Rejected {
                reason: "INSUFFICIENT_MARGIN".into(),
            })
        });
        let f = fixture(gateway);

        let err = f.client.submit(limit_buy("ord-1")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Venue(VenueError::Rejected { .. })));
        assert_eq!(f.bus.statuses(), vec![OrderStatus::Rejected]);
    }

    #[tokio::test]
    async fn not_connected_while_reconciling() {
        let gateway = MockOrderGatewayPort::new();
        let f = fixture(gateway);
        f.monitor.begin_reconciliation();

        let err = f.client.submit(limit_buy("ord-1")).await.unwrap_err();
        assert_eq!(
            err,
            ExecutionError::NotConnected {
                state: ConnectionState::Streaming,
                reconciling: true,
            }
        );
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn duplicate_order_id_collides() {
        let mut gateway = MockOrderGatewayPort::new();
        gateway.expect_submit_order().times(1).returning(|_| Ok(ack("42")));
        let f = fixture(gateway);

        f.client.submit(limit_buy("ord-1")).await.unwrap();
        let err = f.client.submit(limit_buy("ord-1")).await.unwrap_err();
        assert_eq!(err, ExecutionError::CorrelationCollision(CorrelationTag::new("ord-1")));
    }

    #[tokio::test]
    async fn off_increment_price_is_refused_before_sending() {
        let gateway = MockOrderGatewayPort::new();
        let f = fixture(gateway);
        let mut intent = limit_buy("ord-1");
        intent.price = Some(dec!(1.123456));

        let err = f.client.submit(intent).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Codec(CodecError::PrecisionMismatch { .. })));
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn unknown_instrument_and_tiny_quantity() {
        let gateway = MockOrderGatewayPort::new();
        let f = fixture(gateway);

        let mut intent = limit_buy("ord-1");
        intent.instrument = InstrumentId::new("XAU/USD");
        assert_eq!(
            f.client.submit(intent).await.unwrap_err(),
            ExecutionError::UnknownInstrument(InstrumentId::new("XAU/USD"))
        );

        let mut intent = limit_buy("ord-2");
        intent.quantity = dec!(0.4);
        assert!(matches!(
            f.client.submit(intent).await.unwrap_err(),
            ExecutionError::InvalidOrder(_)
        ));
    }

    #[tokio::test]
    async fn cancel_targets_broker_id_then_tag() {
        let mut gateway = MockOrderGatewayPort::new();
        gateway
            .expect_cancel_order()
            .withf(|target| *target == CancelTarget::Broker(BrokerId::new("42")))
            .times(1)
            .returning(|_| Ok(()));
        gateway
            .expect_cancel_order()
            .withf(|target| *target == CancelTarget::Tag(CorrelationTag::new("ord-2")))
            .times(1)
            .returning(|_| Ok(()));
        let f = fixture(gateway);

        let acked = BrokerOrderRef::new(OrderId::new("ord-1")).with_broker_id(BrokerId::new("42"));
        f.client.cancel(&acked).await.unwrap();

        let unacked = BrokerOrderRef::new(OrderId::new("ord-2"));
        f.client.cancel(&unacked).await.unwrap();
        assert_eq!(f.bus.statuses(), vec![OrderStatus::Canceled, OrderStatus::Canceled]);
    }

    #[tokio::test]
    async fn cancel_uncertain_after_second_transport_failure() {
        let mut gateway = MockOrderGatewayPort::new();
        gateway
            .expect_cancel_order()
            .times(2)
            .returning(|_| Err(VenueError::transport("reset")));
        let f = fixture(gateway);

        let order_ref =
            BrokerOrderRef::new(OrderId::new("ord-1")).with_broker_id(BrokerId::new("42"));
        let err = f.client.cancel(&order_ref).await.unwrap_err();
        assert!(matches!(err, ExecutionError::SubmissionUncertain { .. }));
    }
}
