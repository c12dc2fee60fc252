//! Instrument Bounded Context
//!
//! Instrument definitions and the decimal codec that enforces their
//! precision rules on every price and size crossing the venue boundary.

mod definition;
pub mod precision;

pub use definition::{Increment, Instrument, MAX_INCREMENT_EXPONENT};
pub use precision::{
    CodecError, SizeDecode, align_size, decode_price, decode_size, encode_price, encode_size,
    parse_decimal_text,
};
