//! Instrument Catalog
//!
//! Fetch-once, in-memory cache of instrument definitions. The map is built
//! off to the side and swapped in whole, so readers always see either the
//! previous catalog or the new one, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{InstrumentMetadata, InstrumentMetadataPort, VenueError};
use crate::domain::instrument::{Increment, Instrument, precision::parse_decimal_text};
use crate::domain::shared::InstrumentId;

/// Catalog errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Venue query failed.
    #[error("failed to fetch instruments: {0}")]
    Fetch(#[from] VenueError),

    /// Nothing usable came back.
    #[error("instrument catalog is empty")]
    Empty,

    /// Instrument not in the catalog.
    #[error("unknown instrument: {0}")]
    NotFound(InstrumentId),

    /// Definition cannot be turned into an instrument.
    #[error("invalid definition for {symbol}: {reason}")]
    InvalidDefinition {
        /// Symbol of the definition.
        symbol: InstrumentId,
        /// What was wrong.
        reason: String,
    },
}

/// Shared instrument cache.
#[derive(Debug, Default)]
pub struct InstrumentCatalog {
    instruments: RwLock<HashMap<InstrumentId, Arc<Instrument>>>,
}

impl InstrumentCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch definitions from the venue and install them.
    ///
    /// Returns the number of instruments loaded.
    pub async fn load(&self, source: &dyn InstrumentMetadataPort) -> Result<usize, CatalogError> {
        let definitions = source.fetch_instruments().await.inspect_err(|e| {
            tracing::error!(error = %e, "Instrument fetch failed");
        })?;
        self.install(definitions)
    }

    /// Install a static definition list (offline or test configuration).
    pub fn load_static(&self, definitions: Vec<InstrumentMetadata>) -> Result<usize, CatalogError> {
        self.install(definitions)
    }

    /// Explicit refresh. On failure the previous catalog stays in place.
    pub async fn reload(&self, source: &dyn InstrumentMetadataPort) -> Result<usize, CatalogError> {
        tracing::info!("Reloading instrument catalog");
        self.load(source).await
    }

    /// Look up an instrument.
    pub fn lookup(&self, id: &InstrumentId) -> Result<Arc<Instrument>, CatalogError> {
        self.instruments
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    /// Whether `id` is known.
    #[must_use]
    pub fn contains(&self, id: &InstrumentId) -> bool {
        self.instruments.read().contains_key(id)
    }

    /// Number of instruments loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    /// Whether nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }

    /// All loaded instrument ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<_> = self.instruments.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn install(&self, definitions: Vec<InstrumentMetadata>) -> Result<usize, CatalogError> {
        let mut map = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            match build_instrument(&definition) {
                Ok(instrument) => {
                    map.insert(instrument.id.clone(), Arc::new(instrument));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping instrument definition");
                }
            }
        }

        if map.is_empty() {
            return Err(CatalogError::Empty);
        }

        let count = map.len();
        *self.instruments.write() = map;
        tracing::info!(instruments = count, "Instrument catalog loaded");
        Ok(count)
    }
}

/// Build an instrument from venue metadata.
pub fn build_instrument(definition: &InstrumentMetadata) -> Result<Instrument, CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidDefinition {
        symbol: definition.symbol.clone(),
        reason,
    };

    if definition.symbol.as_str().is_empty() {
        return Err(invalid("empty symbol".to_string()));
    }

    let price_increment = Increment::from_exponent(definition.display_precision)
        .ok_or_else(|| invalid(format!("display precision {}", definition.display_precision)))?;
    let size_increment = Increment::from_exponent(definition.trade_units_precision).ok_or_else(
        || invalid(format!("trade units precision {}", definition.trade_units_precision)),
    )?;
    let minimum_size =
        parse_decimal_text(&definition.minimum_trade_size).map_err(|e| invalid(e.to_string()))?;
    if minimum_size < Decimal::ZERO {
        return Err(invalid(format!("negative minimum size {minimum_size}")));
    }

    let instrument = Instrument::new(
        definition.symbol.clone(),
        price_increment,
        size_increment,
        minimum_size,
    );
    Ok(match &definition.display_name {
        Some(name) => instrument.with_display_name(name),
        None => instrument,
    })
}
