use std::sync::Arc;

use chrono::Utc;

use crate::broker::Broker;
use crate::config::Settings;
use crate::error::TradingError;
use crate::execution::{ExecutionAction, ExecutionOutcome, Executor, Journal, JournalEntry, PositionSizer};
use crate::market::MarketObserver;
use crate::models::Action;
use crate::risk::{EquityGuard, StopManager, StopReport};
use crate::strategy::{Arbiter, SignalPolicy};
use crate::Result;

/// What happened to one instrument in one cycle
#[derive(Debug, Clone)]
pub struct InstrumentReport {
    pub instrument: String,
    pub proposed: Action,
    pub action: Action,
    pub stops: StopReport,
    pub outcome: String,
}

#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub cycle: u64,
    pub reports: Vec<InstrumentReport>,
    /// Instruments skipped for missing data or failed execution
    pub skipped: usize,
}

/// Explicit session context: broker, policy, equity guard and journal
///
/// Built once at startup and torn down with `shutdown`. The equity guard is
/// the only state carried across cycles.
pub struct TradingSession {
    broker: Arc<dyn Broker>,
    policy: Box<dyn SignalPolicy>,
    observer: MarketObserver,
    arbiter: Arbiter,
    executor: Executor,
    stop_manager: StopManager,
    guard: EquityGuard,
    journal: Journal,
    instruments: Vec<String>,
    cycle: u64,
}

impl TradingSession {
    pub fn new(settings: &Settings, broker: Arc<dyn Broker>, policy: Box<dyn SignalPolicy>) -> Self {
        Self {
            observer: MarketObserver::from_settings(settings),
            arbiter: Arbiter::from_settings(settings),
            executor: Executor::new(broker.clone(), PositionSizer::from_settings(settings)),
            stop_manager: StopManager::new(broker.clone(), settings.risk.clone()),
            guard: EquityGuard::new(settings.max_drawdown_pct, settings.reset_equity_daily),
            journal: Journal::new(&settings.journal_path),
            instruments: settings.instruments.clone(),
            cycle: 0,
            broker,
            policy,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn guard(&self) -> &EquityGuard {
        &self.guard
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// One pass over every instrument
    ///
    /// Only `EquityGuardTriggered` escapes; every other failure is contained
    /// at the instrument boundary.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        self.cycle += 1;
        let cycle = self.cycle;

        if self.guard.is_halted() {
            return Err(TradingError::EquityGuardTriggered {
                drawdown_pct: self.guard.drawdown_pct(),
                limit_pct: self.guard.limit_pct(),
            });
        }

        match self.broker.account_equity().await {
            Ok(equity) => {
                if let Err(e) = self.guard.observe(equity, Utc::now()) {
                    self.journal
                        .append(
                            cycle,
                            None,
                            JournalEntry::Halt {
                                drawdown_pct: self.guard.drawdown_pct(),
                                limit_pct: self.guard.limit_pct(),
                            },
                        )
                        .await;
                    return Err(e);
                }
            }
            Err(e) => tracing::warn!("Equity unavailable, guard not updated this cycle: {}", e),
        }

        tracing::info!(
            "🔄 [CYCLE {}] {} instruments, drawdown {:.2}%",
            cycle,
            self.instruments.len(),
            self.guard.drawdown_pct()
        );

        let mut summary = CycleSummary {
            cycle,
            ..Default::default()
        };
        for instrument in &self.instruments {
            match self.process_instrument(instrument).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    summary.skipped += 1;
                    match e {
                        TradingError::CapacityExceeded { .. } => {
                            tracing::info!(instrument = %instrument, "⏸️ {}", e)
                        }
                        TradingError::DataUnavailable { .. } => {
                            tracing::warn!(instrument = %instrument, "✗ Skipping: {}", e)
                        }
                        _ => tracing::error!(instrument = %instrument, "✗ {}", e),
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Observe, manage stops, decide, arbitrate, execute and journal one instrument
    pub async fn process_instrument(&self, instrument: &str) -> Result<InstrumentReport> {
        let snapshot = self.observer.observe(self.broker.as_ref(), instrument).await?;

        let stops = self.stop_manager.manage(&snapshot).await;

        let decision = self.policy.decide(&snapshot).await;
        let proposed = decision.action;
        let review = self.arbiter.review(instrument, decision, snapshot.rsi);
        let decision = review.decision;

        let result = self.executor.execute(&decision, &snapshot).await;
        let outcome = match &result {
            Ok(outcome) => outcome.reason.clone(),
            Err(e) => e.to_string(),
        };

        self.journal
            .append(
                self.cycle,
                Some(instrument),
                JournalEntry::Decision {
                    policy: self.policy.name().to_string(),
                    action: decision.action,
                    original_action: review.overridden,
                    confidence: decision.confidence,
                    rationale: decision.rationale.clone(),
                    outcome: outcome.clone(),
                },
            )
            .await;

        let executed = result?;
        self.journal_execution(instrument, &executed).await;

        Ok(InstrumentReport {
            instrument: instrument.to_string(),
            proposed,
            action: decision.action,
            stops,
            outcome,
        })
    }

    async fn journal_execution(&self, instrument: &str, executed: &ExecutionOutcome) {
        match &executed.action {
            ExecutionAction::Opened { ticket, order } => {
                self.journal
                    .append(
                        self.cycle,
                        Some(instrument),
                        JournalEntry::Order {
                            direction: order.direction,
                            volume: order.volume,
                            entry_price: order.entry_price,
                            stop_loss: order.stop_loss,
                            take_profit: order.take_profit,
                            ticket: *ticket,
                        },
                    )
                    .await
            }
            ExecutionAction::Closed { trades, .. } => {
                for trade in trades {
                    self.journal
                        .append(
                            self.cycle,
                            Some(instrument),
                            JournalEntry::TradeResult {
                                ticket: trade.ticket,
                                direction: trade.direction,
                                open_price: trade.open_price,
                                close_price: trade.close_price,
                                diff: trade.diff,
                            },
                        )
                        .await;
                }
            }
            ExecutionAction::Held => {}
        }
    }

    /// Release the broker connection
    pub async fn shutdown(&self) {
        tracing::info!("🛑 Session ending after {} cycles", self.cycle);
        self.broker.shutdown().await;
    }
}
