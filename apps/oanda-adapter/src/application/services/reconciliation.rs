//! Reconciliation Engine
//!
//! Brings the local view back in line with the venue after every (re)connect:
//!
//! 1. Fetch open positions and open orders from the venue.
//! 2. Orders whose tag belongs to a registered intent refresh that intent's
//!    reference and status.
//! 3. Untagged or unknown-tag orders are reported, never adopted or cancelled.
//! 4. Positions are compared per instrument over the union of both sides;
//!    on disagreement the venue wins.
//! 5. Locally open orders the venue no longer lists are reported.
//!
//! The engine never submits or cancels anything, and a second run with no
//! venue-side change emits nothing new. Local state is venue-authoritative
//! even when the bus refuses the report: events that were not delivered are
//! held and published first on the next pass.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::ports::{
    AccountStatePort, EventBusPort, EventPublishError, VenueError, VenueOrder,
};
use crate::domain::connection::ConnectionState;
use crate::domain::events::{
    AdapterEvent, OrderStatusUpdate, PositionDivergence, UnreconciledOrder, UnreconciledReason,
};
use crate::domain::order_execution::BrokerOrderRef;
use crate::domain::position::PositionSnapshot;
use crate::domain::shared::{BrokerId, InstrumentId, UnixNanos};

use super::order_registry::{OrderRegistry, Recovery};
use super::position_book::PositionBook;

/// Reconciliation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconciliationError {
    /// Venue query failed.
    #[error("venue query failed during reconciliation: {0}")]
    Venue(#[from] VenueError),

    /// Reconciliation requested in a state that cannot support it.
    #[error("cannot reconcile while {0}")]
    InvalidState(ConnectionState),

    /// Report could not be published.
    #[error("failed to publish reconciliation event: {0}")]
    Publish(#[from] EventPublishError),
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Local references refreshed from the venue.
    pub recovered: Vec<BrokerOrderRef>,
    /// Venue orders no registered intent accounts for.
    pub unreconciled: Vec<UnreconciledOrder>,
    /// Positions overwritten with the venue's values.
    pub divergences: Vec<PositionDivergence>,
    /// Locally open orders the venue does not list.
    pub missing_on_venue: Vec<BrokerOrderRef>,
    /// Completion time.
    pub completed_at: UnixNanos,
}

impl ReconciliationReport {
    /// Whether local and venue state already agreed on every position and
    /// every tracked order.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.recovered.is_empty() && self.divergences.is_empty() && self.missing_on_venue.is_empty()
    }
}

/// Venue-authoritative reconciliation.
pub struct ReconciliationEngine<A, E>
where
    A: AccountStatePort,
    E: EventBusPort,
{
    account: Arc<A>,
    registry: Arc<OrderRegistry>,
    positions: Arc<PositionBook>,
    bus: Arc<E>,
    reported_foreign: Mutex<HashSet<BrokerId>>,
    undelivered: Mutex<VecDeque<AdapterEvent>>,
}

impl<A, E> ReconciliationEngine<A, E>
where
    A: AccountStatePort,
    E: EventBusPort,
{
    /// Create a reconciliation engine over shared local state.
    pub fn new(
        account: Arc<A>,
        registry: Arc<OrderRegistry>,
        positions: Arc<PositionBook>,
        bus: Arc<E>,
    ) -> Self {
        Self {
            account,
            registry,
            positions,
            bus,
            reported_foreign: Mutex::new(HashSet::new()),
            undelivered: Mutex::new(VecDeque::new()),
        }
    }

    /// Events held back by a failed publish.
    #[must_use]
    pub fn undelivered(&self) -> usize {
        self.undelivered.lock().len()
    }

    /// Run one reconciliation pass.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, ReconciliationError> {
        let venue_positions = self.account.open_positions().await?;
        let venue_orders = self.account.open_orders().await?;

        let mut events = Vec::new();
        let (recovered, unreconciled, missing_on_venue) =
            self.reconcile_orders(&venue_orders, &mut events);
        let divergences = self.reconcile_positions(venue_positions, &mut events);

        self.deliver(events).await?;

        let report = ReconciliationReport {
            recovered,
            unreconciled,
            divergences,
            missing_on_venue,
            completed_at: UnixNanos::now(),
        };

        tracing::info!(
            recovered = report.recovered.len(),
            unreconciled = report.unreconciled.len(),
            divergences = report.divergences.len(),
            missing_on_venue = report.missing_on_venue.len(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// Publish held events, then `events`. On failure the unsent tail is held.
    async fn deliver(&self, events: Vec<AdapterEvent>) -> Result<(), EventPublishError> {
        let mut outbox = std::mem::take(&mut *self.undelivered.lock());
        outbox.extend(events);

        while let Some(event) = outbox.pop_front() {
            if let Err(e) = self.bus.publish(event.clone()).await {
                outbox.push_front(event);
                tracing::warn!(
                    error = %e,
                    held = outbox.len(),
                    "Reconciliation events held for the next pass"
                );
                let mut held = self.undelivered.lock();
                // Another pass may have queued behind us.
                let later = std::mem::replace(&mut *held, outbox);
                held.extend(later);
                return Err(e);
            }
        }
        Ok(())
    }

    fn reconcile_orders(
        &self,
        venue_orders: &[VenueOrder],
        events: &mut Vec<AdapterEvent>,
    ) -> (Vec<BrokerOrderRef>, Vec<UnreconciledOrder>, Vec<BrokerOrderRef>) {
        let now = UnixNanos::now();
        let mut recovered = Vec::new();
        let mut unreconciled = Vec::new();
        let mut seen_tags = HashSet::new();

        for order in venue_orders {
            let recovery = order.correlation_tag.as_ref().map_or(Recovery::Unknown, |tag| {
                self.registry.recover(tag, &order.broker_order_id, order.status)
            });

            match recovery {
                Recovery::Unchanged(tracked) => {
                    seen_tags.insert(tracked.order_ref.correlation_tag);
                }
                Recovery::Updated(tracked) => {
                    tracing::info!(
                        order_id = %tracked.order_ref.order_id,
                        broker_order_id = %order.broker_order_id,
                        status = %tracked.status,
                        "Recovered order reference from venue"
                    );
                    events.push(AdapterEvent::OrderStatusUpdate(OrderStatusUpdate {
                        order_id: tracked.order_ref.order_id.clone(),
                        correlation_tag: tracked.order_ref.correlation_tag.clone(),
                        broker_order_id: tracked.order_ref.broker_order_id.clone(),
                        status: tracked.status,
                        reason: None,
                        ts: now,
                    }));
                    seen_tags.insert(tracked.order_ref.correlation_tag.clone());
                    recovered.push(tracked.order_ref);
                }
                Recovery::Unknown => {
                    let report = foreign_order(order, now);
                    if self.reported_foreign.lock().insert(order.broker_order_id.clone()) {
                        tracing::warn!(
                            broker_order_id = %report.broker_order_id,
                            instrument = %report.instrument,
                            reason = %report.reason,
                            "Unreconciled venue order"
                        );
                        metrics::counter!("oanda_adapter_unreconciled_orders_total").increment(1);
                        events.push(AdapterEvent::UnreconciledOrder(report.clone()));
                    }
                    unreconciled.push(report);
                }
            }
        }

        let missing_on_venue: Vec<_> = self
            .registry
            .open_orders()
            .into_iter()
            .filter(|tracked| !seen_tags.contains(&tracked.order_ref.correlation_tag))
            .map(|tracked| tracked.order_ref)
            .collect();
        for order_ref in &missing_on_venue {
            tracing::info!(
                order_id = %order_ref.order_id,
                "Locally open order not listed by venue"
            );
        }

        (recovered, unreconciled, missing_on_venue)
    }

    fn reconcile_positions(
        &self,
        venue_positions: Vec<PositionSnapshot>,
        events: &mut Vec<AdapterEvent>,
    ) -> Vec<PositionDivergence> {
        let now = UnixNanos::now();
        let venue: HashMap<InstrumentId, PositionSnapshot> = venue_positions
            .into_iter()
            .filter(|p| !p.is_flat())
            .map(|p| (p.instrument.clone(), p))
            .collect();

        let instruments: BTreeSet<InstrumentId> = venue
            .keys()
            .cloned()
            .chain(self.positions.snapshot().into_iter().map(|p| p.instrument))
            .collect();

        let mut divergences = Vec::new();
        for instrument in instruments {
            let local = self.positions.get(&instrument);
            let remote = venue
                .get(&instrument)
                .cloned()
                .unwrap_or_else(|| PositionSnapshot::flat(instrument.clone()));

            if local.agrees_with(&remote) {
                continue;
            }

            tracing::warn!(
                instrument = %instrument,
                local_qty = %local.quantity,
                local_price = %local.avg_price,
                venue_qty = %remote.quantity,
                venue_price = %remote.avg_price,
                "Position divergence, adopting venue position"
            );
            metrics::counter!("oanda_adapter_position_divergences_total").increment(1);

            self.positions.set(remote.clone());
            let divergence = PositionDivergence {
                instrument,
                local,
                venue: remote,
                detected_at: now,
            };
            events.push(AdapterEvent::PositionDivergence(divergence.clone()));
            divergences.push(divergence);
        }
        divergences
    }
}

fn foreign_order(order: &VenueOrder, detected_at: UnixNanos) -> UnreconciledOrder {
    let reason = if order.correlation_tag.is_some() {
        UnreconciledReason::UnknownTag
    } else {
        UnreconciledReason::Untagged
    };
    UnreconciledOrder {
        broker_order_id: order.broker_order_id.clone(),
        correlation_tag: order.correlation_tag.clone(),
        instrument: order.instrument.clone(),
        quantity: order.quantity,
        price: order.price,
        reason,
        detected_at,
    }
}
