//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driver Ports** (Primary/Inbound): How the engine uses the adapter
//! - **Driven Ports** (Secondary/Outbound): How the adapter uses the venue and the bus

mod event_bus_port;
mod venue_adapter_port;
mod venue_port;

pub use event_bus_port::{EventBusPort, EventPublishError, NoOpEventBus};
pub use venue_adapter_port::VenueAdapter;
pub use venue_port::{
    AccountStatePort, CancelTarget, InstrumentMetadata, InstrumentMetadataPort, OrderGatewayPort,
    OrderSubmission, PriceStream, PricingStreamPort, RawPrice, StreamMessage, VenueError,
    VenueOrder, VenueOrderAck,
};

#[cfg(test)]
pub use venue_port::{MockAccountStatePort, MockInstrumentMetadataPort, MockOrderGatewayPort};
