// Simulated exchange
// Rests limit orders locally and fills them against OHLC candles

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::clients::{CancelAck, ExchangeAdapter, OrderAck, OrderRequest};
use crate::error::{GridError, GridResult};
use crate::types::{OrderSide, OrderStatus};

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Orders below this size are rejected
    pub min_order_size: Decimal,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_order_size: Decimal::ZERO,
        }
    }
}

/// A resting order on the simulated book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedFill {
    pub order_id: String,
    pub client_order_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Default)]
struct Book {
    next_id: u64,
    /// Keyed by sequence number so fills come out in placement order
    open: BTreeMap<u64, RestingOrder>,
    filled: Vec<SimulatedFill>,
    failures_remaining: usize,
    creates: usize,
    cancels: usize,
}

/// Cloneable handle; clones share one book.
#[derive(Debug, Clone)]
pub struct SimulatedExchange {
    config: SimulationConfig,
    book: Arc<Mutex<Book>>,
}

impl SimulatedExchange {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            book: Arc::new(Mutex::new(Book::default())),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(SimulationConfig::default())
    }

    fn lock(&self) -> GridResult<MutexGuard<'_, Book>> {
        self.book
            .lock()
            .map_err(|_| GridError::ExchangeCall("simulated book mutex poisoned".to_string()))
    }

    /// Make the next `count` create/cancel calls fail
    pub fn inject_failures(&self, count: usize) -> GridResult<()> {
        self.lock()?.failures_remaining = count;
        Ok(())
    }

    pub fn open_orders(&self) -> GridResult<Vec<RestingOrder>> {
        Ok(self.lock()?.open.values().cloned().collect())
    }

    pub fn fills(&self) -> GridResult<Vec<SimulatedFill>> {
        Ok(self.lock()?.filled.clone())
    }

    /// (creates, cancels) accepted so far
    pub fn call_counts(&self) -> GridResult<(usize, usize)> {
        let book = self.lock()?;
        Ok((book.creates, book.cancels))
    }

    /// Put an order known from a previous session back on the book under
    /// its original id.
    pub fn restore_order(&self, order: RestingOrder) -> GridResult<()> {
        let mut book = self.lock()?;
        let seq = order
            .order_id
            .strip_prefix("sim-")
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(book.next_id + 1);
        if book.open.contains_key(&seq) {
            return Err(GridError::ExchangeCall(format!("order {} already resting", order.order_id)));
        }
        book.next_id = book.next_id.max(seq);
        book.open.insert(seq, order);
        Ok(())
    }

    /// Fill resting orders the candle traded through. Buys fill when the
    /// low reaches the limit, at the better of limit and open; sells when
    /// the high reaches it, likewise.
    pub fn match_orders(
        &self,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        _close: Decimal,
    ) -> GridResult<Vec<SimulatedFill>> {
        let mut book = self.lock()?;
        let crossed: Vec<u64> = book
            .open
            .iter()
            .filter(|(_, order)| match order.side {
                OrderSide::Buy => low <= order.price,
                OrderSide::Sell => high >= order.price,
            })
            .map(|(seq, _)| *seq)
            .collect();

        let mut fills = Vec::with_capacity(crossed.len());
        for seq in crossed {
            let Some(order) = book.open.remove(&seq) else {
                continue;
            };
            let price = match order.side {
                OrderSide::Buy => order.price.min(open),
                OrderSide::Sell => order.price.max(open),
            };
            debug!("Simulated fill {} {} @ {}", order.order_id, order.side, price);
            fills.push(SimulatedFill {
                order_id: order.order_id,
                client_order_id: order.client_order_id,
                side: order.side,
                price,
                quantity: order.quantity,
            });
        }
        book.filled.extend(fills.iter().cloned());
        Ok(fills)
    }

    fn take_failure(book: &mut Book, action: &str) -> GridResult<()> {
        if book.failures_remaining > 0 {
            book.failures_remaining -= 1;
            return Err(GridError::ExchangeCall(format!("injected {} failure", action)));
        }
        Ok(())
    }
}

impl Default for SimulatedExchange {
    fn default() -> Self {
        Self::with_default_config()
    }
}

impl ExchangeAdapter for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    fn create_order(&self, request: &OrderRequest) -> GridResult<OrderAck> {
        let mut book = self.lock()?;
        Self::take_failure(&mut book, "create")?;

        book.next_id += 1;
        let seq = book.next_id;
        let order_id = format!("sim-{}", seq);

        if request.quantity <= Decimal::ZERO || request.quantity < self.config.min_order_size {
            return Ok(OrderAck {
                order_id,
                status: OrderStatus::Rejected,
            });
        }

        book.open.insert(
            seq,
            RestingOrder {
                order_id: order_id.clone(),
                client_order_id: request.client_order_id.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                price: request.price,
                quantity: request.quantity,
            },
        );
        book.creates += 1;
        Ok(OrderAck {
            order_id,
            status: OrderStatus::New,
        })
    }

    fn cancel_order(&self, _symbol: &str, order_id: &str) -> GridResult<CancelAck> {
        let mut book = self.lock()?;
        Self::take_failure(&mut book, "cancel")?;

        let seq = book
            .open
            .iter()
            .find(|(_, order)| order.order_id == order_id)
            .map(|(seq, _)| *seq);
        match seq {
            Some(seq) => {
                book.open.remove(&seq);
                book.cancels += 1;
                Ok(CancelAck {
                    status: OrderStatus::Canceled,
                })
            }
            None if book.filled.iter().any(|fill| fill.order_id == order_id) => Ok(CancelAck {
                status: OrderStatus::Filled,
            }),
            None => Err(GridError::ExchangeCall(format!("unknown order {}", order_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderType;
    use rust_decimal_macros::dec;

    fn request(side: OrderSide, price: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".to_string(),
            side,
            order_type: OrderType::Limit,
            quantity: dec!(0.01),
            price,
            client_order_id: format!("c-{}-{}", side, price),
        }
    }

    #[test]
    fn test_candle_matching() {
        let exchange = SimulatedExchange::default();
        exchange.create_order(&request(OrderSide::Sell, dec!(105))).unwrap();
        exchange.create_order(&request(OrderSide::Buy, dec!(95))).unwrap();
        exchange.create_order(&request(OrderSide::Sell, dec!(120))).unwrap();

        let fills = exchange.match_orders(dec!(100), dec!(110), dec!(99), dec!(108)).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, OrderSide::Sell);
        assert_eq!(fills[0].price, dec!(105));

        // Gap through the buy: filled at the better open price
        let fills = exchange.match_orders(dec!(90), dec!(91), dec!(88), dec!(89)).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(90));
        assert_eq!(exchange.open_orders().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_and_injected_failures() {
        let exchange = SimulatedExchange::default();
        let ack = exchange.create_order(&request(OrderSide::Sell, dec!(105))).unwrap();

        exchange.inject_failures(1).unwrap();
        assert!(exchange.cancel_order("BTCUSDT", &ack.order_id).is_err());
        assert_eq!(
            exchange.cancel_order("BTCUSDT", &ack.order_id).unwrap().status,
            OrderStatus::Canceled
        );
        assert!(exchange.open_orders().unwrap().is_empty());
        assert!(exchange.cancel_order("BTCUSDT", "sim-999").is_err());
    }

    #[test]
    fn test_restored_orders_keep_their_ids() {
        let exchange = SimulatedExchange::default();
        exchange
            .restore_order(RestingOrder {
                order_id: "sim-7".to_string(),
                client_order_id: "c-7".to_string(),
                symbol: "BTCUSDT".to_string(),
                side: OrderSide::Buy,
                price: dec!(95),
                quantity: dec!(0.01),
            })
            .unwrap();

        let ack = exchange.create_order(&request(OrderSide::Sell, dec!(105))).unwrap();
        assert_eq!(ack.order_id, "sim-8");
        assert_eq!(exchange.cancel_order("BTCUSDT", "sim-7").unwrap().status, OrderStatus::Canceled);
    }
}
