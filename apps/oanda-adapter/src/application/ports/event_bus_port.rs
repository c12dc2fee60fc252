//! Event Bus Port (Driven Port)
//!
//! Interface for publishing adapter events onto the engine's bus.

use async_trait::async_trait;

use crate::domain::events::AdapterEvent;

/// Event publishing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventPublishError {
    /// Bus is closed or has no consumers.
    #[error("event bus closed: {message}")]
    Closed {
        /// Error details.
        message: String,
    },

    /// Publishing failed.
    #[error("event publish failed: {message}")]
    PublishFailed {
        /// Error details.
        message: String,
    },
}

/// Port for publishing adapter events.
#[async_trait]
pub trait EventBusPort: Send + Sync {
    /// Publish one event. Returns once the bus has accepted it.
    async fn publish(&self, event: AdapterEvent) -> Result<(), EventPublishError>;

    /// Publish several events in order.
    async fn publish_all(&self, events: Vec<AdapterEvent>) -> Result<(), EventPublishError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Event bus that drops everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventBus;

#[async_trait]
impl EventBusPort for NoOpEventBus {
    async fn publish(&self, _event: AdapterEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}
