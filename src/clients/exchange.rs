//! Exchange adapter contract
//!
//! The sync manager talks to an exchange only through `ExchangeAdapter`.
//! Live connectors, the simulated exchange and test doubles all implement
//! it; calls are blocking and may fail with `GridError::ExchangeCall`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GridResult;
use crate::types::{OrderSide, OrderStatus, OrderType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub client_order_id: String,
}

/// Exchange acknowledgement of a new order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub status: OrderStatus,
}

pub trait ExchangeAdapter: Send + Sync {
    /// Venue name used in logs
    fn name(&self) -> &str;

    fn create_order(&self, request: &OrderRequest) -> GridResult<OrderAck>;

    fn cancel_order(&self, symbol: &str, order_id: &str) -> GridResult<CancelAck>;
}
