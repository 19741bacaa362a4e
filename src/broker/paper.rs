use super::{Broker, BrokerResult, OrderReceipt};
use crate::error::BrokerError;
use crate::models::{Candle, InstrumentSpec, OrderRequest, Position, Quote, Timeframe};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct PaperState {
    candles: HashMap<(String, Timeframe), Vec<Candle>>,
    quotes: HashMap<String, Quote>,
    specs: HashMap<String, InstrumentSpec>,
    positions: Vec<Position>,
    equity: Option<f64>,
    next_ticket: u64,
    reject_orders: Option<String>,
    reject_modifications: Option<String>,
    submitted: Vec<OrderRequest>,
    modifications: Vec<(u64, f64, f64)>,
    closed: Vec<(u64, f64)>,
}

/// In-memory broker for dry runs and tests
///
/// Market data is scripted by the caller, or mirrored from a live `feed`.
/// Orders fill immediately at the requested price, open positions are marked
/// to the latest quote and equity is balance plus open profit.
pub struct PaperBroker {
    state: Mutex<PaperState>,
    feed: Option<Arc<dyn Broker>>,
}

impl PaperBroker {
    pub fn new(equity: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                equity: Some(equity),
                next_ticket: 1,
                ..Default::default()
            }),
            feed: None,
        }
    }

    /// Paper trading on live market data: candles, quotes and specs come from `feed`
    pub fn with_feed(equity: f64, feed: Arc<dyn Broker>) -> Self {
        Self {
            feed: Some(feed),
            ..Self::new(equity)
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> BrokerResult<MutexGuard<'_, PaperState>> {
        self.state
            .lock()
            .map_err(|e| BrokerError::Transport(format!("paper broker poisoned: {}", e)))
    }

    pub fn set_candles(&self, instrument: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.lock()
            .candles
            .insert((instrument.to_string(), timeframe), candles);
    }

    /// Update the quote and re-mark the instrument's open positions
    pub fn set_quote(&self, instrument: &str, quote: Quote) {
        let mut state = self.lock();
        state.quotes.insert(instrument.to_string(), quote);
        for position in state.positions.iter_mut().filter(|p| p.instrument == instrument) {
            let exit = position.direction.exit_price(&quote);
            position.profit = position.price_diff(exit) * position.volume;
        }
    }

    pub fn clear_quote(&self, instrument: &str) {
        self.lock().quotes.remove(instrument);
    }

    pub fn set_spec(&self, instrument: &str, spec: InstrumentSpec) {
        self.lock().specs.insert(instrument.to_string(), spec);
    }

    /// `None` makes equity unavailable
    pub fn set_equity(&self, equity: Option<f64>) {
        self.lock().equity = equity;
    }

    pub fn add_position(&self, position: Position) {
        let mut state = self.lock();
        state.next_ticket = state.next_ticket.max(position.ticket + 1);
        state.positions.push(position);
    }

    /// Reject every new order with `reason` (or accept again with `None`)
    pub fn reject_orders(&self, reason: Option<&str>) {
        self.lock().reject_orders = reason.map(str::to_string);
    }

    pub fn reject_modifications(&self, reason: Option<&str>) {
        self.lock().reject_modifications = reason.map(str::to_string);
    }

    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.lock().submitted.clone()
    }

    /// (ticket, stop_loss, take_profit) for every accepted modification
    pub fn modifications(&self) -> Vec<(u64, f64, f64)> {
        self.lock().modifications.clone()
    }

    /// (ticket, close price) for every closed position
    pub fn closed_positions(&self) -> Vec<(u64, f64)> {
        self.lock().closed.clone()
    }

    pub fn positions(&self, instrument: &str) -> Vec<Position> {
        self.lock()
            .positions
            .iter()
            .filter(|p| p.instrument == instrument)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> BrokerResult<Vec<Candle>> {
        if let Some(feed) = &self.feed {
            return feed.candles(instrument, timeframe, count).await;
        }

        let state = self.state()?;
        let series = state
            .candles
            .get(&(instrument.to_string(), timeframe))
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BrokerError::Unavailable {
                what: format!("{} {} candles", instrument, timeframe),
            })?;

        let start = series.len().saturating_sub(count);
        Ok(series[start..].to_vec())
    }

    async fn quote(&self, instrument: &str) -> BrokerResult<Quote> {
        if let Some(feed) = &self.feed {
            let quote = feed.quote(instrument).await?;
            self.set_quote(instrument, quote);
            return Ok(quote);
        }

        self.state()?
            .quotes
            .get(instrument)
            .copied()
            .ok_or_else(|| BrokerError::Unavailable {
                what: format!("{} tick", instrument),
            })
    }

    async fn open_positions(&self, instrument: &str) -> BrokerResult<Vec<Position>> {
        Ok(self
            .state()?
            .positions
            .iter()
            .filter(|p| p.instrument == instrument)
            .cloned()
            .collect())
    }

    async fn account_equity(&self) -> BrokerResult<f64> {
        let state = self.state()?;
        let balance = state.equity.ok_or_else(|| BrokerError::Unavailable {
            what: "account equity".to_string(),
        })?;
        let open: f64 = state.positions.iter().map(|p| p.profit).sum();
        Ok(balance + open)
    }

    async fn instrument_spec(&self, instrument: &str) -> BrokerResult<InstrumentSpec> {
        if let Some(feed) = &self.feed {
            return feed.instrument_spec(instrument).await;
        }

        Ok(self
            .state()?
            .specs
            .get(instrument)
            .copied()
            .unwrap_or_default())
    }

    async fn submit_order(&self, order: &OrderRequest) -> BrokerResult<OrderReceipt> {
        let mut state = self.state()?;
        if let Some(reason) = &state.reject_orders {
            return Err(BrokerError::Rejected {
                code: 10006,
                message: reason.clone(),
            });
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.submitted.push(order.clone());
        state.positions.push(Position {
            instrument: order.instrument.clone(),
            direction: order.direction,
            volume: order.volume,
            open_price: order.entry_price,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            profit: 0.0,
            ticket,
        });

        Ok(OrderReceipt {
            ticket,
            price: order.entry_price,
        })
    }

    async fn modify_position(&self, ticket: u64, stop_loss: f64, take_profit: f64) -> BrokerResult<()> {
        let mut state = self.state()?;
        if let Some(reason) = &state.reject_modifications {
            return Err(BrokerError::Rejected {
                code: 10016,
                message: reason.clone(),
            });
        }

        let position = state
            .positions
            .iter_mut()
            .find(|p| p.ticket == ticket)
            .ok_or_else(|| BrokerError::Rejected {
                code: 10036,
                message: format!("position {} not found", ticket),
            })?;
        position.stop_loss = stop_loss;
        position.take_profit = take_profit;
        state.modifications.push((ticket, stop_loss, take_profit));

        Ok(())
    }

    async fn close_position(&self, position: &Position, price: f64) -> BrokerResult<()> {
        let mut state = self.state()?;
        let index = state
            .positions
            .iter()
            .position(|p| p.ticket == position.ticket)
            .ok_or_else(|| BrokerError::Rejected {
                code: 10036,
                message: format!("position {} not found", position.ticket),
            })?;

        let closed = state.positions.remove(index);
        let realized = closed.price_diff(price) * closed.volume;
        state.equity = state.equity.map(|balance| balance + realized);
        state.closed.push((position.ticket, price));
        Ok(())
    }
}
