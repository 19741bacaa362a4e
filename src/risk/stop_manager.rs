use std::sync::Arc;

use crate::broker::Broker;
use crate::config::RiskConfig;
use crate::error::TradingError;
use crate::market::MarketSnapshot;
use crate::models::{Direction, Position, Quote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStage {
    BreakEven,
    Trailing,
}

/// New stop-loss for one position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopAdjustment {
    pub stage: StopStage,
    pub stop_loss: f64,
}

/// Break-even / trailing stop for `position`, or `None` when nothing should move
///
/// Stops only ever tighten: a candidate is returned only when the position
/// has no stop yet or the candidate is strictly better than the current one.
pub fn compute_stop_adjustment(
    position: &Position,
    quote: &Quote,
    atr: f64,
    config: &RiskConfig,
) -> Option<StopAdjustment> {
    if !(atr.is_finite() && atr > 0.0) {
        return None;
    }

    let spread = quote.spread().max(0.0);
    let (favorable, trailing, break_even) = match position.direction {
        Direction::Long => (
            quote.bid - position.open_price,
            quote.bid - config.trailing_distance_atr * atr,
            position.open_price + spread,
        ),
        Direction::Short => (
            position.open_price - quote.ask,
            quote.ask + config.trailing_distance_atr * atr,
            position.open_price - spread,
        ),
    };

    let (stage, candidate) = if favorable > config.trailing_trigger_atr * atr {
        (StopStage::Trailing, trailing)
    } else if favorable > config.break_even_trigger_atr * atr {
        (StopStage::BreakEven, break_even)
    } else {
        return None;
    };

    let tighter = match position.direction {
        Direction::Long => candidate > position.stop_loss,
        Direction::Short => candidate < position.stop_loss,
    };
    if position.has_stop_loss() && !tighter {
        return None;
    }

    Some(StopAdjustment {
        stage,
        stop_loss: candidate,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    pub modified: usize,
    pub failed: usize,
}

/// Moves stops on open positions every cycle, independent of new signals
pub struct StopManager {
    broker: Arc<dyn Broker>,
    config: RiskConfig,
}

impl StopManager {
    pub fn new(broker: Arc<dyn Broker>, config: RiskConfig) -> Self {
        Self { broker, config }
    }

    /// Re-derive every position's stop from scratch; failed modifications wait for the next cycle
    pub async fn manage(&self, snapshot: &MarketSnapshot) -> StopReport {
        let mut report = StopReport::default();
        let Some(atr) = snapshot.atr.filter(|a| *a > 0.0) else {
            return report;
        };

        for position in &snapshot.positions {
            let Some(adjustment) = compute_stop_adjustment(position, &snapshot.quote, atr, &self.config) else {
                continue;
            };

            match self
                .broker
                .modify_position(position.ticket, adjustment.stop_loss, position.take_profit)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        instrument = %position.instrument,
                        ticket = position.ticket,
                        stage = ?adjustment.stage,
                        "🛡️ Stop moved {:.5} -> {:.5}",
                        position.stop_loss,
                        adjustment.stop_loss
                    );
                    report.modified += 1;
                }
                Err(e) => {
                    let err = TradingError::ModificationRejected {
                        ticket: position.ticket,
                        reason: e.to_string(),
                    };
                    tracing::warn!(instrument = %position.instrument, "{}", err);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
