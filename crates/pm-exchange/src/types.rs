use chrono::{DateTime, Utc};
use pm_core::AmountLike;
use serde::{Deserialize, Serialize};

/// One level of an order-book side. Price may arrive as a bare number or
/// `{value, currency}` (`examples/original_source/basic.py::amount()`).
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    #[serde(alias = "price")]
    pub px: AmountLike,
    #[serde(alias = "size")]
    pub qty: AmountLike,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    #[serde(alias = "bids")]
    pub bids: Vec<BookLevel>,
    #[serde(alias = "asks", alias = "offers")]
    pub offers: Vec<BookLevel>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    pub currency: String,
    #[serde(alias = "current_balance", alias = "balance")]
    pub current_balance: AmountLike,
    #[serde(alias = "buying_power", default)]
    pub buying_power: Option<AmountLike>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionEntry {
    #[serde(alias = "net_position")]
    pub net_position: AmountLike,
    pub cost: AmountLike,
    #[serde(alias = "avg_price")]
    pub avg_price: AmountLike,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOrderRequest {
    pub slug: String,
    pub side: String,
    pub price: f64,
    pub qty: f64,
    #[serde(rename = "type")]
    pub order_type: String, // "IOC"
}

#[derive(Debug, Clone, Deserialize)]
pub struct Execution {
    pub price: AmountLike,
    pub qty: AmountLike,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOrderResponse {
    pub order_id: String,
    pub state: String,
    #[serde(default)]
    pub executions: Vec<Execution>,
    #[serde(default)]
    pub avg_price: Option<AmountLike>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub state: String,
    #[serde(default)]
    pub executions: Vec<Execution>,
    #[serde(default)]
    pub avg_price: Option<AmountLike>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketDto {
    pub slug: String,
    pub question: String,
    pub end_time: DateTime<Utc>,
    pub state: String,
}
