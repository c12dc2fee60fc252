//! Symbol and order-specifier conversion.
//!
//! OANDA names instruments `BASE_QUOTE` (`EUR_USD`, `XAU_USD`, `DE30_EUR`);
//! the engine uses `BASE/QUOTE`.

use crate::application::ports::CancelTarget;
use crate::domain::shared::InstrumentId;

/// `EUR_USD` → `EUR/USD`.
#[must_use]
pub fn from_oanda(name: &str) -> InstrumentId {
    InstrumentId::new(name.replace('_', "/"))
}

/// `EUR/USD` → `EUR_USD`.
#[must_use]
pub fn to_oanda(instrument: &InstrumentId) -> String {
    instrument.as_str().replace('/', "_")
}

/// Comma-joined OANDA names for the `instruments` query parameter.
#[must_use]
pub fn instrument_list(instruments: &[InstrumentId]) -> String {
    instruments
        .iter()
        .map(to_oanda)
        .collect::<Vec<_>>()
        .join(",")
}

/// Order specifier for `/orders/{specifier}` paths.
///
/// A venue id is used as is; a client id is prefixed with `@`.
#[must_use]
pub fn order_specifier(target: &CancelTarget) -> String {
    match target {
        CancelTarget::Broker(id) => id.as_str().to_string(),
        CancelTarget::Tag(tag) => format!("@{tag}"),
    }
}
