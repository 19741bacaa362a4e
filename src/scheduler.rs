use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::session::TradingSession;

/// Why the scheduler stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// Equity guard halted the session
    Halted,
    /// Ctrl-C between cycles
    Interrupted,
    /// `max_cycles` reached
    Completed,
}

/// Drive the session on a fixed period until halted, interrupted or done
///
/// The first cycle runs immediately. A cycle that overruns the period makes
/// the scheduler skip missed ticks rather than burst. The broker is shut
/// down on every exit path.
pub async fn run_scheduler(
    session: &mut TradingSession,
    period: Duration,
    max_cycles: Option<u64>,
) -> SchedulerExit {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let exit = loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("🛑 Ctrl-C received, shutting down");
                break SchedulerExit::Interrupted;
            }
            _ = ticker.tick() => {}
        }

        match session.run_cycle().await {
            Ok(summary) => {
                tracing::info!(
                    "✓ Cycle {} done: {} processed, {} skipped",
                    summary.cycle,
                    summary.reports.len(),
                    summary.skipped
                );
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("🚨 Trading halted: {}", e);
                break SchedulerExit::Halted;
            }
            Err(e) => tracing::error!("Cycle failed: {}", e),
        }

        if max_cycles.is_some_and(|max| session.cycle() >= max) {
            break SchedulerExit::Completed;
        }
    };

    session.shutdown().await;
    exit
}
