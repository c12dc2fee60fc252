//! OANDA implementation of the venue ports.

use async_trait::async_trait;
use futures::StreamExt;

use super::api_types::{
    InstrumentsResponse, OpenPositionsResponse, OrderCreateResponse, OrderRequestBody,
    PendingOrdersResponse,
};
use super::config::{OandaConfig, OandaEnvironment};
use super::error::OandaError;
use super::http_client::OandaHttpClient;
use super::stream::decode_body;
use super::symbology::{instrument_list, order_specifier};
use crate::application::ports::{
    AccountStatePort, CancelTarget, InstrumentMetadata, InstrumentMetadataPort, OrderGatewayPort,
    OrderSubmission, PriceStream, PricingStreamPort, VenueError, VenueOrder, VenueOrderAck,
};
use crate::domain::position::PositionSnapshot;
use crate::domain::shared::InstrumentId;

/// OANDA v20 venue adapter.
///
/// Implements all four venue ports over one HTTP client so that reads share
/// the same limiter.
#[derive(Debug)]
pub struct OandaAdapter {
    client: OandaHttpClient,
    environment: OandaEnvironment,
    instruments: Vec<InstrumentId>,
}

impl OandaAdapter {
    /// Create a new adapter from config.
    ///
    /// `instruments` narrows the instrument query; empty loads every
    /// instrument tradeable on the account.
    pub fn new(config: &OandaConfig, instruments: Vec<InstrumentId>) -> Result<Self, OandaError> {
        let client = OandaHttpClient::new(config)?;

        tracing::info!(
            environment = %config.environment,
            account_id = %config.account_id,
            instruments = instruments.len(),
            "OANDA adapter initialized"
        );

        Ok(Self {
            client,
            environment: config.environment,
            instruments,
        })
    }

    /// Get the current environment.
    #[must_use]
    pub const fn environment(&self) -> OandaEnvironment {
        self.environment
    }
}

#[async_trait]
impl InstrumentMetadataPort for OandaAdapter {
    async fn fetch_instruments(&self) -> Result<Vec<InstrumentMetadata>, VenueError> {
        let query = if self.instruments.is_empty() {
            Vec::new()
        } else {
            vec![("instruments", instrument_list(&self.instruments))]
        };

        let response: InstrumentsResponse = self
            .client
            .get(&self.client.account_path("/instruments"), &query)
            .await?;

        tracing::debug!(
            count = response.instruments.len(),
            "Fetched instrument definitions"
        );
        Ok(response
            .instruments
            .iter()
            .map(super::api_types::OandaInstrument::to_metadata)
            .collect())
    }
}

#[async_trait]
impl PricingStreamPort for OandaAdapter {
    async fn open_stream(&self, instruments: &[InstrumentId]) -> Result<PriceStream, VenueError> {
        let query = vec![("instruments", instrument_list(instruments))];
        let response = self
            .client
            .open_stream(&self.client.account_path("/pricing/stream"), &query)
            .await?;

        tracing::info!(
            instruments = instruments.len(),
            "Pricing stream opened"
        );
        Ok(decode_body(Box::pin(response.bytes_stream())).boxed())
    }
}

#[async_trait]
impl OrderGatewayPort for OandaAdapter {
    async fn submit_order(&self, order: &OrderSubmission) -> Result<VenueOrderAck, VenueError> {
        let body = OrderRequestBody::from(order);

        tracing::debug!(
            correlation_tag = %order.correlation_tag,
            instrument = %body.order.instrument,
            units = %body.order.units,
            order_type = %body.order.order_type,
            "Posting order"
        );

        let response: OrderCreateResponse = self
            .client
            .post(&self.client.account_path("/orders"), &body)
            .await?;
        Ok(response.to_ack()?)
    }

    async fn cancel_order(&self, target: &CancelTarget) -> Result<(), VenueError> {
        let path = self
            .client
            .account_path(&format!("/orders/{}/cancel", order_specifier(target)));
        let _: serde_json::Value = self.client.put(&path).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStatePort for OandaAdapter {
    async fn open_orders(&self) -> Result<Vec<VenueOrder>, VenueError> {
        let response: PendingOrdersResponse = self
            .client
            .get(&self.client.account_path("/pendingOrders"), &[])
            .await?;

        let mut orders = Vec::with_capacity(response.orders.len());
        for order in &response.orders {
            if let Some(venue_order) = order.to_venue_order()? {
                orders.push(venue_order);
            }
        }
        Ok(orders)
    }

    async fn open_positions(&self) -> Result<Vec<PositionSnapshot>, VenueError> {
        let response: OpenPositionsResponse = self
            .client
            .get(&self.client.account_path("/openPositions"), &[])
            .await?;

        let mut positions = Vec::with_capacity(response.positions.len());
        for position in &response.positions {
            if let Some(snapshot) = position.to_snapshot()? {
                positions.push(snapshot);
            }
        }
        Ok(positions)
    }
}
