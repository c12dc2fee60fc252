//! Decimal codec.
//!
//! Exact conversion between the venue's decimal-as-text fields and
//! `rust_decimal::Decimal`, using the instrument's increments as the
//! canonical scale. Nothing here touches binary floating point.
//!
//! - Prices are never rounded: a value that is not a multiple of the price
//!   increment fails with [`CodecError::PrecisionMismatch`].
//! - Sizes may be rounded toward zero to the size increment; the result is
//!   reported as [`SizeDecode::Truncated`] and logged.

use rust_decimal::{Decimal, RoundingStrategy};

use super::definition::{Increment, Instrument};
use crate::domain::shared::InstrumentId;

/// Errors converting decimal values for the venue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Value is not an exact multiple of the instrument's increment.
    #[error("precision mismatch for {instrument}: {value} is not a multiple of {increment}")]
    PrecisionMismatch {
        /// Instrument whose increment was violated.
        instrument: InstrumentId,
        /// The offending value as text.
        value: String,
        /// The increment that was expected.
        increment: Increment,
    },

    /// Text is not a plain decimal number.
    #[error("malformed decimal text '{0}'")]
    Malformed(String),

    /// Negative value where only non-negative values are valid.
    #[error("negative value {value} for {instrument}")]
    Negative {
        /// Instrument the value belongs to.
        instrument: InstrumentId,
        /// The offending value as text.
        value: String,
    },
}

/// Outcome of decoding or aligning a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeDecode {
    /// Value was already on the size increment.
    Exact(Decimal),
    /// Value was rounded toward zero onto the size increment.
    Truncated {
        /// Value before rounding.
        original: Decimal,
        /// Value after rounding.
        value: Decimal,
    },
}

impl SizeDecode {
    /// The usable size.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        match self {
            Self::Exact(v) | Self::Truncated { value: v, .. } => *v,
        }
    }

    /// Whether rounding happened.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

/// Decode a venue price string for `instrument`.
///
/// Accepted values come back at the instrument's canonical price scale.
pub fn decode_price(text: &str, instrument: &Instrument) -> Result<Decimal, CodecError> {
    let value = parse_decimal_text(text)?;
    check_price(value, instrument)?;
    Ok(with_scale(value, instrument.price_increment))
}

/// Encode an engine price as the exact text the venue expects.
pub fn encode_price(value: Decimal, instrument: &Instrument) -> Result<String, CodecError> {
    check_price(value, instrument)?;
    Ok(with_scale(value, instrument.price_increment).to_string())
}

/// Decode a (possibly signed) venue size string for `instrument`.
pub fn decode_size(text: &str, instrument: &Instrument) -> Result<SizeDecode, CodecError> {
    let value = parse_decimal_text(text)?;
    Ok(align_size(value, instrument))
}

/// Align an engine-side size onto the instrument's size increment.
///
/// Off-increment values are rounded toward zero, which never increases the
/// absolute exposure requested.
pub fn align_size(value: Decimal, instrument: &Instrument) -> SizeDecode {
    let increment = instrument.size_increment;
    if increment.divides(value) {
        return SizeDecode::Exact(with_scale(value, increment));
    }

    let truncated = value.round_dp_with_strategy(increment.exponent(), RoundingStrategy::ToZero);
    tracing::warn!(
        instrument = %instrument.id,
        original = %value,
        truncated = %truncated,
        increment = %increment,
        "Size truncated to instrument increment"
    );
    SizeDecode::Truncated {
        original: value,
        value: with_scale(truncated, increment),
    }
}

/// Encode a size as venue text. The size must already be on the increment.
pub fn encode_size(value: Decimal, instrument: &Instrument) -> Result<String, CodecError> {
    let increment = instrument.size_increment;
    if !increment.divides(value) {
        return Err(CodecError::PrecisionMismatch {
            instrument: instrument.id.clone(),
            value: value.to_string(),
            increment,
        });
    }
    Ok(with_scale(value, increment).to_string())
}

/// Parse plain decimal text: optional `-`, digits, optional `.digits`.
///
/// Exponents, underscores, whitespace, and a leading `+` are rejected, and
/// so is any value that cannot be held exactly.
pub fn parse_decimal_text(text: &str) -> Result<Decimal, CodecError> {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (unsigned, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || fraction.is_some_and(|f| !all_digits(f)) {
        return Err(CodecError::Malformed(text.to_string()));
    }

    Decimal::from_str_exact(text).map_err(|_| CodecError::Malformed(text.to_string()))
}

fn check_price(value: Decimal, instrument: &Instrument) -> Result<(), CodecError> {
    if value < Decimal::ZERO {
        return Err(CodecError::Negative {
            instrument: instrument.id.clone(),
            value: value.to_string(),
        });
    }
    if !instrument.price_increment.divides(value) {
        return Err(CodecError::PrecisionMismatch {
            instrument: instrument.id.clone(),
            value: value.to_string(),
            increment: instrument.price_increment,
        });
    }
    Ok(())
}

fn with_scale(value: Decimal, increment: Increment) -> Decimal {
    let mut scaled = value.normalize();
    scaled.rescale(increment.exponent());
    scaled
}
