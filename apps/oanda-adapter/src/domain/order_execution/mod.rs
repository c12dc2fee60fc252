//! Order Execution Bounded Context
//!
//! Intents coming from the engine, the status lifecycle the adapter tracks,
//! and the reference that ties an intent to its venue-side order.

mod broker_order_ref;
mod intent;
pub mod value_objects;

pub use broker_order_ref::BrokerOrderRef;
pub use intent::{IntentError, OrderIntent};
pub use value_objects::{OrderSide, OrderStatus, OrderType, TimeInForce};
