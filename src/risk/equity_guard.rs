use chrono::{DateTime, NaiveDate, Utc};

use crate::error::TradingError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Normal,
    /// Terminal for the session
    Halted,
}

/// Account-level drawdown kill-switch
///
/// The baseline is the first equity observed (and, with daily reset, the
/// first equity observed on each new UTC day). Once halted it never resumes.
#[derive(Debug, Clone)]
pub struct EquityGuard {
    limit_pct: f64,
    reset_daily: bool,
    baseline: Option<f64>,
    baseline_date: Option<NaiveDate>,
    drawdown_pct: f64,
    state: GuardState,
}

impl EquityGuard {
    pub fn new(limit_pct: f64, reset_daily: bool) -> Self {
        Self {
            limit_pct,
            reset_daily,
            baseline: None,
            baseline_date: None,
            drawdown_pct: 0.0,
            state: GuardState::Normal,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == GuardState::Halted
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn drawdown_pct(&self) -> f64 {
        self.drawdown_pct
    }

    pub fn limit_pct(&self) -> f64 {
        self.limit_pct
    }

    fn halted_error(&self) -> TradingError {
        TradingError::EquityGuardTriggered {
            drawdown_pct: self.drawdown_pct,
            limit_pct: self.limit_pct,
        }
    }

    /// Record an equity reading; `Err(EquityGuardTriggered)` once drawdown reaches the limit
    pub fn observe(&mut self, equity: f64, now: DateTime<Utc>) -> Result<f64> {
        if self.is_halted() {
            return Err(self.halted_error());
        }

        let today = now.date_naive();
        let new_day = self.reset_daily && self.baseline_date.is_some_and(|d| d != today);
        if self.baseline.is_none() || new_day {
            if equity > 0.0 {
                if new_day {
                    tracing::info!("📅 New trading day, equity baseline reset to {:.2}", equity);
                } else {
                    tracing::info!("Equity baseline set to {:.2}", equity);
                }
                self.baseline = Some(equity);
                self.baseline_date = Some(today);
            } else {
                // a standing baseline is still checked below
                tracing::warn!("Ignoring non-positive equity {:.2} as baseline", equity);
            }
        }

        let Some(baseline) = self.baseline else {
            return Ok(0.0);
        };

        self.drawdown_pct = (baseline - equity) / baseline * 100.0;
        if self.drawdown_pct >= self.limit_pct {
            self.state = GuardState::Halted;
            tracing::error!(
                baseline = baseline,
                equity = equity,
                "🚨 EQUITY GUARD TRIGGERED: drawdown {:.2}% >= limit {:.2}%",
                self.drawdown_pct,
                self.limit_pct
            );
            return Err(self.halted_error());
        }

        Ok(self.drawdown_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_halts_at_three_percent_drawdown() {
        let mut guard = EquityGuard::new(2.0, true);
        assert_eq!(guard.observe(10_000.0, at(1, 9)).unwrap(), 0.0);

        let err = guard.observe(9_700.0, at(1, 10)).unwrap_err();
        assert!(matches!(err, TradingError::EquityGuardTriggered { .. }));
        assert!((guard.drawdown_pct() - 3.0).abs() < 1e-9);
        assert!(guard.is_halted());
    }

    #[test]
    fn test_halt_is_terminal() {
        let mut guard = EquityGuard::new(2.0, true);
        guard.observe(10_000.0, at(1, 9)).unwrap();
        assert!(guard.observe(9_750.0, at(1, 10)).is_err());

        // recovery and a new day change nothing
        assert!(guard.observe(12_000.0, at(1, 11)).is_err());
        assert!(guard.observe(12_000.0, at(2, 9)).is_err());
        assert_eq!(guard.state(), GuardState::Halted);
    }

    #[test]
    fn test_below_limit_stays_normal() {
        let mut guard = EquityGuard::new(2.0, true);
        guard.observe(10_000.0, at(1, 9)).unwrap();
        let drawdown = guard.observe(9_850.0, at(1, 10)).unwrap();

        assert!((drawdown - 1.5).abs() < 1e-9);
        assert_eq!(guard.state(), GuardState::Normal);
        // gains are negative drawdown
        assert!(guard.observe(10_100.0, at(1, 11)).unwrap() < 0.0);
    }

    #[test]
    fn test_daily_reset() {
        let mut guard = EquityGuard::new(2.0, true);
        guard.observe(10_000.0, at(1, 9)).unwrap();
        guard.observe(9_850.0, at(1, 23)).unwrap();

        // yesterday's 1.5% loss does not carry over
        guard.observe(9_850.0, at(2, 0)).unwrap();
        assert_eq!(guard.baseline(), Some(9_850.0));
        assert!(guard.observe(9_700.0, at(2, 1)).unwrap() < 2.0);
    }

    #[test]
    fn test_wiped_account_on_new_day_halts() {
        let mut guard = EquityGuard::new(2.0, true);
        guard.observe(10_000.0, at(1, 9)).unwrap();

        let err = guard.observe(0.0, at(2, 0)).unwrap_err();
        assert!(matches!(err, TradingError::EquityGuardTriggered { .. }));
        assert!(guard.is_halted());
        assert_eq!(guard.baseline(), Some(10_000.0));
        assert!((guard.drawdown_pct() - 100.0).abs() < 1e-9);
        assert!(guard.observe(0.0, at(2, 1)).is_err());
    }

    #[test]
    fn test_non_positive_first_reading_sets_no_baseline() {
        let mut guard = EquityGuard::new(2.0, true);
        assert_eq!(guard.observe(0.0, at(1, 9)).unwrap(), 0.0);
        assert_eq!(guard.baseline(), None);
        assert_eq!(guard.state(), GuardState::Normal);

        guard.observe(10_000.0, at(1, 10)).unwrap();
        assert_eq!(guard.baseline(), Some(10_000.0));
    }

    #[test]
    fn test_session_baseline_without_reset() {
        let mut guard = EquityGuard::new(2.0, false);
        guard.observe(10_000.0, at(1, 9)).unwrap();
        guard.observe(9_850.0, at(1, 23)).unwrap();

        assert!(guard.observe(9_790.0, at(2, 1)).is_err());
        assert_eq!(guard.baseline(), Some(10_000.0));
    }
}
