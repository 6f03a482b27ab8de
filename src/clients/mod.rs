// External exchange clients

pub mod exchange;

pub use exchange::{CancelAck, ExchangeAdapter, OrderAck, OrderRequest};
