//! Reconciliation Integration Tests
//!
//! Venue-authoritative reconciliation over the broadcast bus: position
//! divergence, tag recovery, foreign orders, and idempotent repeats.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;

use oanda_adapter::application::ports::{AccountStatePort, VenueError, VenueOrder};
use oanda_adapter::application::services::{OrderRegistry, PositionBook, ReconciliationEngine};
use oanda_adapter::domain::events::UnreconciledReason;
use oanda_adapter::{
    AdapterEvent, BroadcastEventBus, BrokerId, CorrelationTag, InstrumentId, OrderId,
    OrderIntent, OrderSide, OrderStatus, PositionSnapshot, ReconciliationError,
};

/// Account state the test can rewrite between passes.
#[derive(Default)]
struct VenueAccount {
    orders: Mutex<Vec<VenueOrder>>,
    positions: Mutex<Vec<PositionSnapshot>>,
    fail_positions: Mutex<Option<VenueError>>,
}

#[async_trait]
impl AccountStatePort for VenueAccount {
    async fn open_orders(&self) -> Result<Vec<VenueOrder>, VenueError> {
        Ok(self.orders.lock().clone())
    }

    async fn open_positions(&self) -> Result<Vec<PositionSnapshot>, VenueError> {
        if let Some(err) = self.fail_positions.lock().clone() {
            return Err(err);
        }
        Ok(self.positions.lock().clone())
    }
}

struct Harness {
    account: Arc<VenueAccount>,
    registry: Arc<OrderRegistry>,
    book: Arc<PositionBook>,
    engine: ReconciliationEngine<VenueAccount, BroadcastEventBus>,
    events: broadcast::Receiver<AdapterEvent>,
}

impl Harness {
    fn new() -> Self {
        let account = Arc::new(VenueAccount::default());
        let registry = Arc::new(OrderRegistry::new());
        let book = Arc::new(PositionBook::new());
        let bus = Arc::new(BroadcastEventBus::new(64));
        let events = bus.subscribe();
        let engine = ReconciliationEngine::new(
            Arc::clone(&account),
            Arc::clone(&registry),
            Arc::clone(&book),
            bus,
        );
        Self {
            account,
            registry,
            book,
            engine,
            events,
        }
    }

    fn drain(&mut self) -> Vec<AdapterEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

fn eur_usd() -> InstrumentId {
    InstrumentId::new("EUR/USD")
}

fn venue_order(id: &str, tag: Option<&str>) -> VenueOrder {
    VenueOrder {
        broker_order_id: BrokerId::new(id),
        correlation_tag: tag.map(CorrelationTag::new),
        instrument: eur_usd(),
        quantity: dec!(1000),
        price: Some(dec!(1.05000)),
        status: OrderStatus::Accepted,
    }
}

#[tokio::test]
async fn venue_position_replaces_divergent_local_position() {
    let mut harness = Harness::new();
    harness
        .book
        .set(PositionSnapshot::new(eur_usd(), dec!(5000), dec!(1.09)));
    harness
        .account
        .positions
        .lock()
        .push(PositionSnapshot::new(eur_usd(), dec!(10000), dec!(1.10)));

    let report = harness.engine.reconcile().await.unwrap();

    assert_eq!(report.divergences.len(), 1);
    let divergence = &report.divergences[0];
    assert_eq!(divergence.local.quantity, dec!(5000));
    assert_eq!(divergence.venue.quantity, dec!(10000));
    assert_eq!(divergence.quantity_delta(), dec!(5000));

    let adopted = harness.book.get(&eur_usd());
    assert_eq!(adopted.quantity, dec!(10000));
    assert_eq!(adopted.avg_price, dec!(1.10));

    let events = harness.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], AdapterEvent::PositionDivergence(_)));

    // Nothing changed at the venue: the second pass is silent.
    let again = harness.engine.reconcile().await.unwrap();
    assert!(again.is_clean());
    assert!(harness.drain().is_empty());
}

#[tokio::test]
async fn tagged_order_recovers_registered_intent() {
    let mut harness = Harness::new();
    let intent = OrderIntent::limit(
        OrderId::new("ord-1"),
        eur_usd(),
        OrderSide::Buy,
        dec!(1000),
        dec!(1.05000),
    );
    let order_ref = harness.registry.register(&intent).unwrap();
    harness
        .registry
        .set_status(&order_ref.correlation_tag, OrderStatus::Uncertain);
    harness
        .account
        .orders
        .lock()
        .push(venue_order("42", Some("ord-1")));

    let report = harness.engine.reconcile().await.unwrap();

    assert_eq!(report.recovered.len(), 1);
    assert_eq!(report.recovered[0].order_id, OrderId::new("ord-1"));
    assert_eq!(
        report.recovered[0].broker_order_id,
        Some(BrokerId::new("42"))
    );
    assert!(report.unreconciled.is_empty());
    assert_eq!(harness.registry.len(), 1);

    let events = harness.drain();
    assert_eq!(events.len(), 1);
    let AdapterEvent::OrderStatusUpdate(update) = &events[0] else {
        panic!("expected status update, got {:?}", events[0]);
    };
    assert_eq!(update.status, OrderStatus::Accepted);

    let again = harness.engine.reconcile().await.unwrap();
    assert!(again.recovered.is_empty());
    assert!(harness.drain().is_empty());
}

#[tokio::test]
async fn foreign_orders_are_reported_once() {
    let mut harness = Harness::new();
    harness.account.orders.lock().extend([
        venue_order("7", None),
        venue_order("8", Some("someone-else")),
    ]);

    let report = harness.engine.reconcile().await.unwrap();

    assert_eq!(report.unreconciled.len(), 2);
    assert_eq!(report.unreconciled[0].reason, UnreconciledReason::Untagged);
    assert_eq!(report.unreconciled[1].reason, UnreconciledReason::UnknownTag);
    assert!(harness.registry.is_empty());
    assert_eq!(harness.drain().len(), 2);

    // Still listed, still reported in the pass result, not re-published.
    let again = harness.engine.reconcile().await.unwrap();
    assert_eq!(again.unreconciled.len(), 2);
    assert!(harness.drain().is_empty());
}

#[tokio::test]
async fn locally_open_order_missing_at_venue_is_listed() {
    let mut harness = Harness::new();
    let intent = OrderIntent::market(
        OrderId::new("ord-gone"),
        eur_usd(),
        OrderSide::Sell,
        dec!(1000),
    );
    let order_ref = harness.registry.register(&intent).unwrap();
    harness
        .registry
        .record_ack(&order_ref.correlation_tag, BrokerId::new("55"), OrderStatus::Accepted);

    let report = harness.engine.reconcile().await.unwrap();

    assert_eq!(report.missing_on_venue.len(), 1);
    assert_eq!(report.missing_on_venue[0].order_id, OrderId::new("ord-gone"));
    assert!(!report.is_clean());
    assert!(harness.drain().is_empty());
}

#[tokio::test]
async fn position_query_failure_aborts_the_pass() {
    let mut harness = Harness::new();
    harness
        .book
        .set(PositionSnapshot::new(eur_usd(), dec!(5000), dec!(1.09)));
    *harness.account.fail_positions.lock() = Some(VenueError::transport("timeout"));

    let err = harness.engine.reconcile().await.unwrap_err();

    assert!(matches!(err, ReconciliationError::Venue(_)));
    assert_eq!(harness.book.get(&eur_usd()).quantity, dec!(5000));
    assert!(harness.drain().is_empty());
}
