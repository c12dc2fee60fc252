//! Connection Monitor
//!
//! Single source of truth for the streaming connection's state and the
//! reconciliation-in-progress flag. Both live in one `watch` channel so a
//! reader never combines a fresh state with a stale flag, and callers can
//! await transitions instead of polling.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::domain::connection::{ConnectionState, InvalidTransition};
use crate::domain::events::ConnectionStateChange;
use crate::domain::shared::UnixNanos;

/// Connection state plus the reconciliation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Reconciliation is running; orders and quotes are held back.
    pub reconciling: bool,
}

impl ConnectionStatus {
    /// Whether the execution path may send orders.
    #[must_use]
    pub const fn accepts_orders(&self) -> bool {
        self.state.is_streaming() && !self.reconciling
    }
}

/// Failure waiting for a connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// State not reached in time.
    #[error("timed out after {0:?} waiting for connection state")]
    Timeout(Duration),

    /// Connection closed while waiting.
    #[error("connection closed while waiting")]
    Closed,
}

/// Watch-backed connection status holder.
#[derive(Debug)]
pub struct ConnectionMonitor {
    tx: watch::Sender<ConnectionStatus>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    /// Create a monitor in `Disconnected`.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::default());
        Self { tx }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.tx.borrow().state
    }

    /// Whether orders may be sent right now.
    #[must_use]
    pub fn accepts_orders(&self) -> bool {
        self.tx.borrow().accepts_orders()
    }

    /// Receiver for status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Move to `to` if the state machine allows it.
    ///
    /// Entering `Streaming` raises the reconciliation flag in the same update,
    /// so no reader ever sees a streaming connection that accepts orders before
    /// reconciliation has run. Leaving `Streaming` clears the flag.
    pub fn transition(
        &self,
        to: ConnectionState,
    ) -> Result<ConnectionStateChange, InvalidTransition> {
        let mut outcome = Err(InvalidTransition {
            from: self.state(),
            to,
        });

        self.tx.send_if_modified(|status| {
            let from = status.state;
            if !from.can_transition_to(to) {
                outcome = Err(InvalidTransition { from, to });
                return false;
            }
            status.state = to;
            status.reconciling = to.is_streaming();
            outcome = Ok(ConnectionStateChange {
                from,
                to,
                at: UnixNanos::now(),
            });
            true
        });

        if let Ok(change) = &outcome {
            metrics::gauge!("oanda_adapter_connection_state").set(to.as_gauge());
            tracing::info!(from = %change.from, to = %change.to, "Connection state changed");
        }
        outcome
    }

    /// Raise the reconciliation flag. Only valid while `Streaming`; `false` when
    /// the flag was already up.
    pub fn begin_reconciliation(&self) -> bool {
        self.tx.send_if_modified(|status| {
            if status.state.is_streaming() && !status.reconciling {
                status.reconciling = true;
                true
            } else {
                false
            }
        })
    }

    /// Lower the reconciliation flag.
    pub fn finish_reconciliation(&self) {
        self.tx
            .send_if_modified(|status| std::mem::replace(&mut status.reconciling, false));
    }

    /// Move to the terminal `Closed` state. `None` if already closed.
    pub fn close(&self) -> Option<ConnectionStateChange> {
        self.transition(ConnectionState::Closed).ok()
    }

    /// Wait until `predicate` holds, failing on timeout or closure.
    pub async fn wait_until<F>(
        &self,
        timeout: Duration,
        predicate: F,
    ) -> Result<ConnectionStatus, WaitError>
    where
        F: Fn(&ConnectionStatus) -> bool,
    {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|status| predicate(status) || status.state.is_terminal()),
        )
        .await;

        match waited {
            Err(_) => Err(WaitError::Timeout(timeout)),
            // The sender lives in `self`, so the channel cannot close here.
            Ok(Err(_)) => Err(WaitError::Closed),
            Ok(Ok(status)) => {
                let status = *status;
                if predicate(&status) {
                    Ok(status)
                } else {
                    Err(WaitError::Closed)
                }
            }
        }
    }

    /// Wait until the connection reaches `state`.
    ///
    /// Reaching `Streaming` does not mean orders are accepted yet; use
    /// [`Self::wait_until_ready`] for that.
    pub async fn wait_for_state(
        &self,
        state: ConnectionState,
        timeout: Duration,
    ) -> Result<ConnectionStatus, WaitError> {
        self.wait_until(timeout, |status| status.state == state).await
    }

    /// Wait until orders are accepted (streaming and reconciled).
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<ConnectionStatus, WaitError> {
        self.wait_until(timeout, ConnectionStatus::accepts_orders).await
    }
}
