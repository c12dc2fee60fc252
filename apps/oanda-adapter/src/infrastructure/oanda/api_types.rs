//! OANDA v20 request and response types.
//!
//! These types map directly to the v20 REST and streaming JSON formats.
//! Numeric fields arrive as decimal strings and stay text until the codec
//! or the position math needs them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::OandaError;
use super::symbology::{from_oanda, to_oanda};
use crate::application::ports::{InstrumentMetadata, OrderSubmission, VenueOrder, VenueOrderAck};
use crate::domain::instrument::parse_decimal_text;
use crate::domain::order_execution::{OrderSide, OrderStatus};
use crate::domain::position::PositionSnapshot;
use crate::domain::shared::{BrokerId, CorrelationTag};

/// `clientExtensions.tag` on every order this adapter places.
pub const CLIENT_TAG: &str = "oanda-adapter";

// ============================================================================
// Instruments
// ============================================================================

/// `GET /v3/accounts/{id}/instruments` response.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentsResponse {
    /// Tradeable instruments of the account.
    pub instruments: Vec<OandaInstrument>,
}

/// Instrument definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OandaInstrument {
    /// OANDA name (`EUR_USD`).
    pub name: String,
    /// `CURRENCY`, `CFD` or `METAL`.
    #[serde(rename = "type", default)]
    pub instrument_type: Option<String>,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Decimal places of the price.
    pub display_precision: u32,
    /// Decimal places of the units.
    pub trade_units_precision: u32,
    /// Smallest order size.
    pub minimum_trade_size: String,
}

impl OandaInstrument {
    /// Convert to venue-neutral metadata.
    #[must_use]
    pub fn to_metadata(&self) -> InstrumentMetadata {
        InstrumentMetadata {
            symbol: from_oanda(&self.name),
            display_name: self.display_name.clone(),
            display_precision: self.display_precision,
            trade_units_precision: self.trade_units_precision,
            minimum_trade_size: self.minimum_trade_size.clone(),
        }
    }
}

// ============================================================================
// Order Request Types
// ============================================================================

/// `POST /v3/accounts/{id}/orders` body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequestBody {
    /// The order.
    pub order: OandaOrderRequest,
}

/// Order request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OandaOrderRequest {
    /// `MARKET`, `LIMIT` or `STOP`.
    #[serde(rename = "type")]
    pub order_type: String,
    /// OANDA instrument name.
    pub instrument: String,
    /// Signed units (negative sells).
    pub units: String,
    /// Limit or stop price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Time in force.
    pub time_in_force: String,
    /// How the fill interacts with open trades.
    pub position_fill: String,
    /// Client identification attached to the order.
    pub client_extensions: ClientExtensions,
}

/// Client-supplied order identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientExtensions {
    /// Client order id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Free-form tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl From<&OrderSubmission> for OrderRequestBody {
    fn from(order: &OrderSubmission) -> Self {
        let units = match order.side {
            OrderSide::Buy => order.quantity.clone(),
            OrderSide::Sell => format!("-{}", order.quantity),
        };
        Self {
            order: OandaOrderRequest {
                order_type: order.order_type.to_string(),
                instrument: to_oanda(&order.instrument),
                units,
                price: order.price.clone(),
                time_in_force: order.time_in_force.code().to_string(),
                position_fill: "DEFAULT".to_string(),
                client_extensions: ClientExtensions {
                    id: Some(order.correlation_tag.as_str().to_string()),
                    tag: Some(CLIENT_TAG.to_string()),
                    comment: None,
                },
            },
        }
    }
}

// ============================================================================
// Order Response Types
// ============================================================================

/// Transaction reference carrying only the fields the adapter reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRef {
    /// Transaction id.
    pub id: String,
    /// Transaction type.
    #[serde(rename = "type", default)]
    pub transaction_type: Option<String>,
    /// Cancel or reject reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Rejection reason on reject transactions.
    #[serde(default)]
    pub reject_reason: Option<String>,
}

/// `POST /orders` success response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreateResponse {
    /// The order creation; its id is the order id.
    #[serde(default)]
    pub order_create_transaction: Option<TransactionRef>,
    /// Present when the order filled immediately.
    #[serde(default)]
    pub order_fill_transaction: Option<TransactionRef>,
    /// Present when the order was canceled immediately (FOK/IOC misses).
    #[serde(default)]
    pub order_cancel_transaction: Option<TransactionRef>,
    /// Latest transaction id of the account.
    #[serde(default)]
    pub last_transaction_id: Option<String>,
}

impl OrderCreateResponse {
    /// Convert to an acknowledgment.
    pub fn to_ack(&self) -> Result<VenueOrderAck, OandaError> {
        let created = self.order_create_transaction.as_ref().ok_or_else(|| {
            OandaError::JsonParse("response has no orderCreateTransaction".to_string())
        })?;

        let (status, reason) = if let Some(cancel) = &self.order_cancel_transaction {
            (OrderStatus::Canceled, cancel.reason.clone())
        } else if self.order_fill_transaction.is_some() {
            (OrderStatus::Filled, None)
        } else {
            (OrderStatus::Accepted, None)
        };

        Ok(VenueOrderAck {
            broker_order_id: BrokerId::new(&created.id),
            status,
            reason,
        })
    }
}

/// Error body returned on 4xx/5xx.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OandaErrorResponse {
    /// Error code.
    #[serde(default)]
    pub error_code: Option<String>,
    /// Error message.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Present when an order request was rejected.
    #[serde(default)]
    pub order_reject_transaction: Option<TransactionRef>,
}

impl OandaErrorResponse {
    /// Rejection reason, if the body describes an order reject.
    #[must_use]
    pub fn reject_reason(&self) -> Option<String> {
        self.order_reject_transaction
            .as_ref()
            .and_then(|tx| tx.reject_reason.clone())
            .or_else(|| self.error_code.clone())
    }
}

// ============================================================================
// Pending Orders
// ============================================================================

/// `GET /pendingOrders` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingOrdersResponse {
    /// Working orders.
    pub orders: Vec<OandaOrder>,
}

/// Order as reported by the venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OandaOrder {
    /// Order id.
    pub id: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Order state.
    pub state: String,
    /// Instrument; absent on dependent orders (take profit, stop loss).
    #[serde(default)]
    pub instrument: Option<String>,
    /// Signed units; absent on dependent orders.
    #[serde(default)]
    pub units: Option<String>,
    /// Order price.
    #[serde(default)]
    pub price: Option<String>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: Option<String>,
    /// Client identification.
    #[serde(default)]
    pub client_extensions: Option<ClientExtensions>,
}

impl OandaOrder {
    /// Convert to a venue order.
    ///
    /// Returns `Ok(None)` for orders attached to trades (take profit, stop
    /// loss, trailing stop), which carry no instrument or units of their own.
    pub fn to_venue_order(&self) -> Result<Option<VenueOrder>, OandaError> {
        let (Some(instrument), Some(units)) = (&self.instrument, &self.units) else {
            return Ok(None);
        };

        let quantity = parse_number("units", units)?;
        let price = self
            .price
            .as_deref()
            .map(|price| parse_number("price", price))
            .transpose()?;
        let correlation_tag = self
            .client_extensions
            .as_ref()
            .and_then(|ext| ext.id.as_deref())
            .filter(|id| !id.is_empty())
            .map(CorrelationTag::new);

        Ok(Some(VenueOrder {
            broker_order_id: BrokerId::new(&self.id),
            correlation_tag,
            instrument: from_oanda(instrument),
            quantity,
            price,
            status: parse_order_state(&self.state),
        }))
    }
}

/// Map an OANDA order state to a status.
#[must_use]
pub fn parse_order_state(state: &str) -> OrderStatus {
    match state {
        "FILLED" | "TRIGGERED" => OrderStatus::Filled,
        "CANCELLED" => OrderStatus::Canceled,
        _ => OrderStatus::Accepted,
    }
}

// ============================================================================
// Positions
// ============================================================================

/// `GET /openPositions` response.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenPositionsResponse {
    /// Positions with a non-zero side.
    pub positions: Vec<OandaPosition>,
}

/// Position with its long and short sides.
#[derive(Debug, Clone, Deserialize)]
pub struct OandaPosition {
    /// OANDA instrument name.
    pub instrument: String,
    /// Long side.
    pub long: PositionSide,
    /// Short side (units are zero or negative).
    pub short: PositionSide,
}

/// One side of a position.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSide {
    /// Signed units.
    pub units: String,
    /// Average price; absent when the side is empty.
    #[serde(default)]
    pub average_price: Option<String>,
}

impl OandaPosition {
    /// Net the two sides.
    ///
    /// Returns `Ok(None)` when the sides cancel out. A net long takes the long
    /// side's average price and a net short the short side's.
    pub fn to_snapshot(&self) -> Result<Option<PositionSnapshot>, OandaError> {
        let long = parse_number("long.units", &self.long.units)?;
        let short = parse_number("short.units", &self.short.units)?;
        let net = long + short;
        if net.is_zero() {
            return Ok(None);
        }

        let side = if net > Decimal::ZERO {
            &self.long
        } else {
            &self.short
        };
        let avg_price = side
            .average_price
            .as_deref()
            .map(|price| parse_number("averagePrice", price))
            .transpose()?
            .unwrap_or(Decimal::ZERO);

        Ok(Some(PositionSnapshot::new(
            from_oanda(&self.instrument),
            net,
            avg_price,
        )))
    }
}

/// Decimal wire field, held to the codec's strict grammar.
fn parse_number(field: &str, text: &str) -> Result<Decimal, OandaError> {
    parse_decimal_text(text).map_err(|e| OandaError::JsonParse(format!("{field}: {e}")))
}

// ============================================================================
// Pricing Stream
// ============================================================================

/// One NDJSON line of the pricing stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamLine {
    /// Price update.
    Price(PriceLine),
    /// Keep-alive, every 5 seconds.
    Heartbeat(HeartbeatLine),
}

/// Price update line.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceLine {
    /// OANDA instrument name.
    pub instrument: String,
    /// RFC3339 time.
    pub time: String,
    /// Bid ladder, best first.
    #[serde(default)]
    pub bids: Vec<PriceBucket>,
    /// Ask ladder, best first.
    #[serde(default)]
    pub asks: Vec<PriceBucket>,
    /// Whether the instrument can currently be traded.
    #[serde(default)]
    pub tradeable: Option<bool>,
}

/// Price level.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceBucket {
    /// Price text.
    pub price: String,
}

/// Heartbeat line.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatLine {
    /// RFC3339 time.
    pub time: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::{OrderType, TimeInForce};
    use crate::domain::shared::InstrumentId;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test]
    fn instrument_to_metadata() {
        let json = r#"{
            "name": "USD_JPY",
            "type": "CURRENCY",
            "displayName": "USD/JPY",
            "pipLocation": -2,
            "displayPrecision": 3,
            "tradeUnitsPrecision": 0,
            "minimumTradeSize": "1",
            "marginRate": "0.04"
        }"#;
        let instrument: OandaInstrument = serde_json::from_str(json).unwrap();
        let meta = instrument.to_metadata();
        assert_eq!(meta.symbol, InstrumentId::new("USD/JPY"));
        assert_eq!(meta.display_precision, 3);
        assert_eq!(meta.trade_units_precision, 0);
        assert_eq!(meta.minimum_trade_size, "1");
    }

    fn submission(side: OrderSide, order_type: OrderType, price: Option<&str>) -> OrderSubmission {
        OrderSubmission {
            correlation_tag: CorrelationTag::new("a1b2"),
            instrument: InstrumentId::new("EUR/USD"),
            side,
            order_type,
            quantity: "10000".to_string(),
            price: price.map(str::to_string),
            time_in_force: TimeInForce::Gtc,
        }
    }

    #[test]
    fn order_body_matches_wire_format() {
        let body = OrderRequestBody::from(&submission(
            OrderSide::Buy,
            OrderType::Limit,
            Some("1.10000"),
        ));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "order": {
                    "type": "LIMIT",
                    "instrument": "EUR_USD",
                    "units": "10000",
                    "price": "1.10000",
                    "timeInForce": "GTC",
                    "positionFill": "DEFAULT",
                    "clientExtensions": {"id": "a1b2", "tag": "oanda-adapter"}
                }
            })
        );
    }

    #[test]
    fn sell_units_are_negative_and_market_has_no_price() {
        let body = OrderRequestBody::from(&submission(OrderSide::Sell, OrderType::Market, None));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["order"]["units"], "-10000");
        assert!(json["order"].get("price").is_none());
    }

    #[test]
    fn create_response_accepted() {
        let json = r#"{
            "orderCreateTransaction": {"id": "6372", "type": "LIMIT_ORDER"},
            "relatedTransactionIDs": ["6372"],
            "lastTransactionID": "6372"
        }"#;
        let response: OrderCreateResponse = serde_json::from_str(json).unwrap();
        let ack = response.to_ack().unwrap();
        assert_eq!(ack.broker_order_id, BrokerId::new("6372"));
        assert_eq!(ack.status, OrderStatus::Accepted);
    }

    #[test]
    fn create_response_filled() {
        let json = r#"{
            "orderCreateTransaction": {"id": "10"},
            "orderFillTransaction": {"id": "11", "type": "ORDER_FILL"}
        }"#;
        let response: OrderCreateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.to_ack().unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn create_response_canceled_keeps_reason() {
        let json = r#"{
            "orderCreateTransaction": {"id": "10"},
            "orderCancelTransaction": {"id": "11", "reason": "MARKET_HALTED"}
        }"#;
        let response: OrderCreateResponse = serde_json::from_str(json).unwrap();
        let ack = response.to_ack().unwrap();
        assert_eq!(ack.status, OrderStatus::Canceled);
        assert_eq!(ack.reason.as_deref(), Some("MARKET_HALTED"));
    }

    #[test]
    fn create_response_without_create_transaction_is_an_error() {
        let response: OrderCreateResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(response.to_ack(), Err(OandaError::JsonParse(_))));
    }

    #[test]
    fn error_body_reject_reason() {
        let json = r#"{
            "orderRejectTransaction": {"id": "5", "rejectReason": "INSUFFICIENT_MARGIN"},
            "errorCode": "INSUFFICIENT_MARGIN",
            "errorMessage": "Insufficient margin"
        }"#;
        let body: OandaErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.reject_reason().as_deref(), Some("INSUFFICIENT_MARGIN"));
    }

    #[test_case("PENDING", OrderStatus::Accepted)]
    #[test_case("FILLED", OrderStatus::Filled)]
    #[test_case("TRIGGERED", OrderStatus::Filled)]
    #[test_case("CANCELLED", OrderStatus::Canceled)]
    fn order_state_mapping(state: &str, expected: OrderStatus) {
        assert_eq!(parse_order_state(state), expected);
    }

    #[test]
    fn pending_order_with_client_id() {
        let json = r#"{
            "id": "42",
            "type": "LIMIT",
            "state": "PENDING",
            "instrument": "EUR_USD",
            "units": "-2500",
            "price": "1.12000",
            "timeInForce": "GTC",
            "clientExtensions": {"id": "tag-1", "tag": "oanda-adapter"}
        }"#;
        let order: OandaOrder = serde_json::from_str(json).unwrap();
        let venue = order.to_venue_order().unwrap().unwrap();
        assert_eq!(venue.broker_order_id, BrokerId::new("42"));
        assert_eq!(venue.correlation_tag, Some(CorrelationTag::new("tag-1")));
        assert_eq!(venue.instrument, InstrumentId::new("EUR/USD"));
        assert_eq!(venue.quantity, dec!(-2500));
        assert_eq!(venue.price, Some(dec!(1.12)));
    }

    #[test]
    fn dependent_orders_are_skipped() {
        let json = r#"{"id": "43", "type": "TAKE_PROFIT", "state": "PENDING", "tradeID": "40", "price": "1.2"}"#;
        let order: OandaOrder = serde_json::from_str(json).unwrap();
        assert!(order.to_venue_order().unwrap().is_none());
    }

    fn position(long: (&str, Option<&str>), short: (&str, Option<&str>)) -> OandaPosition {
        OandaPosition {
            instrument: "USD_JPY".to_string(),
            long: PositionSide {
                units: long.0.to_string(),
                average_price: long.1.map(str::to_string),
            },
            short: PositionSide {
                units: short.0.to_string(),
                average_price: short.1.map(str::to_string),
            },
        }
    }

    #[test]
    fn net_short_uses_short_average() {
        let snapshot = position(("1000", Some("145.000")), ("-1500", Some("146.000")))
            .to_snapshot()
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.instrument, InstrumentId::new("USD/JPY"));
        assert_eq!(snapshot.quantity, dec!(-500));
        assert_eq!(snapshot.avg_price, dec!(146));
    }

    #[test]
    fn net_long_uses_long_average() {
        let snapshot = position(("10000", Some("1.10000")), ("0", None))
            .to_snapshot()
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.quantity, dec!(10000));
        assert_eq!(snapshot.avg_price, dec!(1.1));
    }

    #[test]
    fn flat_net_is_skipped() {
        let result = position(("500", Some("1.1")), ("-500", Some("1.2")))
            .to_snapshot()
            .unwrap();
        assert!(result.is_none());
    }

    #[test_case("lots" ; "not a number")]
    #[test_case(" 1000" ; "leading whitespace")]
    #[test_case("1000 " ; "trailing whitespace")]
    #[test_case("1.00000000000000000000000000001" ; "beyond decimal precision")]
    #[test_case("1e3" ; "exponent")]
    fn bad_units_are_an_error(units: &str) {
        let result = position((units, None), ("0", None)).to_snapshot();
        assert!(matches!(result, Err(OandaError::JsonParse(_))));
    }

    #[test]
    fn bad_average_price_is_an_error() {
        let result = position(("1000", Some("1.1 ")), ("0", None)).to_snapshot();
        assert!(matches!(result, Err(OandaError::JsonParse(_))));
    }

    #[test]
    fn stream_lines_deserialize_by_type() {
        let price: StreamLine = serde_json::from_str(
            r#"{"type":"PRICE","instrument":"EUR_USD","time":"2024-01-02T10:00:00.000000001Z",
                "bids":[{"price":"1.10000","liquidity":10000000}],
                "asks":[{"price":"1.10010","liquidity":10000000}],"tradeable":true}"#,
        )
        .unwrap();
        assert!(matches!(price, StreamLine::Price(ref p) if p.bids[0].price == "1.10000"));

        let heartbeat: StreamLine =
            serde_json::from_str(r#"{"type":"HEARTBEAT","time":"2024-01-02T10:00:05Z"}"#).unwrap();
        assert!(matches!(heartbeat, StreamLine::Heartbeat(_)));
    }
}
