//! Position Book
//!
//! The engine's local view of net positions per instrument. Flat positions
//! are not stored.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::position::PositionSnapshot;
use crate::domain::shared::InstrumentId;

/// Local net positions.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: RwLock<HashMap<InstrumentId, PositionSnapshot>>,
}

impl PositionBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Position for `instrument`, or a flat one.
    #[must_use]
    pub fn get(&self, instrument: &InstrumentId) -> PositionSnapshot {
        self.positions
            .read()
            .get(instrument)
            .cloned()
            .unwrap_or_else(|| PositionSnapshot::flat(instrument.clone()))
    }

    /// Replace the position. A flat snapshot removes it.
    pub fn set(&self, snapshot: PositionSnapshot) {
        let mut positions = self.positions.write();
        if snapshot.is_flat() {
            positions.remove(&snapshot.instrument);
        } else {
            positions.insert(snapshot.instrument.clone(), snapshot);
        }
    }

    /// Remove the position, returning what was held.
    pub fn remove(&self, instrument: &InstrumentId) -> Option<PositionSnapshot> {
        self.positions.write().remove(instrument)
    }

    /// All open positions, sorted by instrument.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PositionSnapshot> {
        let mut all: Vec<_> = self.positions.read().values().cloned().collect();
        all.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        all
    }

    /// Number of open positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.read().len()
    }

    /// Whether every position is flat.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.read().is_empty()
    }
}
