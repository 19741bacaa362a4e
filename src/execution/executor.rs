use std::sync::Arc;

use crate::broker::Broker;
use crate::error::TradingError;
use crate::execution::PositionSizer;
use crate::market::MarketSnapshot;
use crate::models::{Action, DecisionResult, Direction, OrderRequest};
use crate::Result;

/// A position closed by a CLOSE decision
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub ticket: u64,
    pub direction: Direction,
    pub open_price: f64,
    pub close_price: f64,
    /// Signed price difference, positive for a win
    pub diff: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Opened { ticket: u64, order: OrderRequest },
    Closed { trades: Vec<ClosedTrade>, failed: usize },
    Held,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub action: ExecutionAction,
    pub reason: String,
}

/// Routes an approved decision to the broker
pub struct Executor {
    broker: Arc<dyn Broker>,
    sizer: PositionSizer,
}

impl Executor {
    pub fn new(broker: Arc<dyn Broker>, sizer: PositionSizer) -> Self {
        Self { broker, sizer }
    }

    /// Execute one decision against the snapshot it was made on
    ///
    /// Broker refusals come back as `OrderRejected`, a full book as
    /// `CapacityExceeded`. Nothing is retried.
    pub async fn execute(&self, decision: &DecisionResult, snapshot: &MarketSnapshot) -> Result<ExecutionOutcome> {
        match decision.action {
            Action::Hold => Ok(ExecutionOutcome {
                action: ExecutionAction::Held,
                reason: "Held position".to_string(),
            }),
            Action::Buy => self.open(Direction::Long, decision, snapshot).await,
            Action::Sell => self.open(Direction::Short, decision, snapshot).await,
            Action::Close => Ok(self.close_all(snapshot).await),
        }
    }

    async fn open(
        &self,
        direction: Direction,
        decision: &DecisionResult,
        snapshot: &MarketSnapshot,
    ) -> Result<ExecutionOutcome> {
        let instrument = snapshot.instrument.as_str();
        self.sizer.check_capacity(instrument, snapshot.positions.len())?;

        let spec = self.broker.instrument_spec(instrument).await?;
        let order = self
            .sizer
            .build_order(instrument, direction, decision, &snapshot.quote, &spec);

        let receipt = self
            .broker
            .submit_order(&order)
            .await
            .map_err(|e| TradingError::OrderRejected {
                instrument: instrument.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            instrument = %instrument,
            ticket = receipt.ticket,
            volume = order.volume,
            "✅ {} {} @ {:.5} (SL {:.5}, TP {:.5})",
            direction.as_str(),
            instrument,
            receipt.price,
            order.stop_loss,
            order.take_profit
        );

        Ok(ExecutionOutcome {
            reason: format!(
                "Opened {} {} lots @ {:.5}",
                direction.as_str(),
                order.volume,
                receipt.price
            ),
            action: ExecutionAction::Opened {
                ticket: receipt.ticket,
                order,
            },
        })
    }

    async fn close_all(&self, snapshot: &MarketSnapshot) -> ExecutionOutcome {
        if snapshot.positions.is_empty() {
            return ExecutionOutcome {
                action: ExecutionAction::Closed {
                    trades: Vec::new(),
                    failed: 0,
                },
                reason: "No open positions to close".to_string(),
            };
        }

        let mut trades = Vec::new();
        let mut failed = 0;
        for position in &snapshot.positions {
            let close_price = position.direction.exit_price(&snapshot.quote);
            match self.broker.close_position(position, close_price).await {
                Ok(()) => {
                    let diff = position.price_diff(close_price);
                    tracing::info!(
                        instrument = %position.instrument,
                        ticket = position.ticket,
                        "💰 Closed {} @ {:.5} (diff {:+.5})",
                        position.direction.as_str(),
                        close_price,
                        diff
                    );
                    trades.push(ClosedTrade {
                        ticket: position.ticket,
                        direction: position.direction,
                        open_price: position.open_price,
                        close_price,
                        diff,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        instrument = %position.instrument,
                        ticket = position.ticket,
                        "Failed to close position: {}",
                        e
                    );
                    failed += 1;
                }
            }
        }

        ExecutionOutcome {
            reason: format!("Closed {} positions ({} failed)", trades.len(), failed),
            action: ExecutionAction::Closed { trades, failed },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::config::{SizingConfig, StopConfig};
    use crate::models::{Position, Quote, StopDistances};

    fn snapshot(positions: Vec<Position>) -> MarketSnapshot {
        MarketSnapshot {
            instrument: "XAUUSD".to_string(),
            quote: Quote { bid: 1900.0, ask: 1900.4 },
            spread: 0.4,
            fast_timeframe: crate::models::Timeframe::M1,
            slow_timeframe: crate::models::Timeframe::M5,
            frames: vec![],
            positions,
            atr: Some(2.0),
            rsi: Some(50.0),
        }
    }

    fn decision(action: Action, confidence: f64) -> DecisionResult {
        DecisionResult {
            action,
            confidence,
            rationale: "test".to_string(),
            atr: Some(2.0),
            stops: None,
        }
    }

    fn position(ticket: u64, direction: Direction, open_price: f64) -> Position {
        Position {
            instrument: "XAUUSD".to_string(),
            direction,
            volume: 1.0,
            open_price,
            stop_loss: 0.0,
            take_profit: 0.0,
            profit: 0.0,
            ticket,
        }
    }

    fn executor(broker: Arc<PaperBroker>, max_open_trades: usize) -> Executor {
        Executor::new(
            broker,
            PositionSizer::new(SizingConfig::default(), StopConfig::default(), max_open_trades),
        )
    }

    #[tokio::test]
    async fn test_buy_opens_at_ask() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        let outcome = executor(broker.clone(), 1)
            .execute(&decision(Action::Buy, 0.85), &snapshot(vec![]))
            .await
            .unwrap();

        let ExecutionAction::Opened { ticket, order } = outcome.action else {
            panic!("expected an opened position");
        };
        assert_eq!(ticket, 1);
        assert_eq!(order.entry_price, 1900.4);
        assert_eq!(order.volume, 2.0);
        assert_eq!(broker.submitted_orders(), vec![order]);
    }

    #[tokio::test]
    async fn test_rule_stops_take_precedence() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        let mut d = decision(Action::Sell, 1.0);
        d.stops = Some(StopDistances {
            stop_loss: 4.0,
            take_profit: 3.0,
        });

        executor(broker.clone(), 1).execute(&d, &snapshot(vec![])).await.unwrap();

        let order = &broker.submitted_orders()[0];
        assert_eq!(order.entry_price, 1900.0);
        assert_eq!(order.stop_loss, 1904.0);
        assert_eq!(order.take_profit, 1897.0);
    }

    #[tokio::test]
    async fn test_capacity_refuses_without_submitting() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        let err = executor(broker.clone(), 1)
            .execute(
                &decision(Action::Buy, 0.9),
                &snapshot(vec![position(7, Direction::Long, 1890.0)]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TradingError::CapacityExceeded { .. }));
        assert!(broker.submitted_orders().is_empty());
    }

    #[tokio::test]
    async fn test_broker_rejection() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        broker.reject_orders(Some("market closed"));

        let err = executor(broker, 1)
            .execute(&decision(Action::Buy, 0.5), &snapshot(vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, TradingError::OrderRejected { .. }));
        assert!(err.to_string().contains("market closed"));
    }

    #[tokio::test]
    async fn test_close_all_at_opposite_side() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        let long = position(1, Direction::Long, 1895.0);
        let short = position(2, Direction::Short, 1899.0);
        broker.add_position(long.clone());
        broker.add_position(short.clone());

        let outcome = executor(broker.clone(), 1)
            .execute(&decision(Action::Close, 0.7), &snapshot(vec![long, short]))
            .await
            .unwrap();

        let ExecutionAction::Closed { trades, failed } = outcome.action else {
            panic!("expected closed trades");
        };
        assert_eq!(failed, 0);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].close_price, 1900.0);
        assert_eq!(trades[0].diff, 5.0);
        assert_eq!(trades[1].close_price, 1900.4);
        assert!((trades[1].diff + 1.4).abs() < 1e-9);
        assert_eq!(broker.closed_positions(), vec![(1, 1900.0), (2, 1900.4)]);
    }

    #[tokio::test]
    async fn test_hold_is_noop() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        let outcome = executor(broker.clone(), 1)
            .execute(&decision(Action::Hold, 0.0), &snapshot(vec![]))
            .await
            .unwrap();

        assert_eq!(outcome.action, ExecutionAction::Held);
        assert_eq!(outcome.reason, "Held position");
        assert!(broker.submitted_orders().is_empty());
    }
}
