// Broker collaborator: market data, positions and order routing
pub mod http;
pub mod paper;

pub use http::HttpBroker;
pub use paper::PaperBroker;

use crate::error::BrokerError;
use crate::models::{Candle, InstrumentSpec, OrderRequest, Position, Quote, Timeframe};
use async_trait::async_trait;

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Confirmation of an accepted market order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub ticket: u64,
    pub price: f64,
}

/// Everything the trading core needs from a broker
///
/// Every call returns a discriminated result; implementations never retry,
/// a failure surfaces as a skipped instrument and is retried next cycle.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Last `count` candles, oldest first; the last one is still forming
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> BrokerResult<Vec<Candle>>;

    async fn quote(&self, instrument: &str) -> BrokerResult<Quote>;

    async fn open_positions(&self, instrument: &str) -> BrokerResult<Vec<Position>>;

    async fn account_equity(&self) -> BrokerResult<f64>;

    async fn instrument_spec(&self, _instrument: &str) -> BrokerResult<InstrumentSpec> {
        Ok(InstrumentSpec::default())
    }

    async fn submit_order(&self, order: &OrderRequest) -> BrokerResult<OrderReceipt>;

    async fn modify_position(&self, ticket: u64, stop_loss: f64, take_profit: f64) -> BrokerResult<()>;

    /// Close the whole position at `price`
    async fn close_position(&self, position: &Position, price: f64) -> BrokerResult<()>;

    /// Release the connection; called once when the session ends
    async fn shutdown(&self) {}
}
