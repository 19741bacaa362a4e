use crate::config::Settings;
use crate::models::{Action, DecisionResult};

pub const RSI_BLOCK_SUFFIX: &str = " [BLOCKED BY RSI FILTER]";

/// Outcome of the safety review
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub decision: DecisionResult,
    /// Action proposed by the policy when it was overridden
    pub overridden: Option<Action>,
}

/// Momentum-exhaustion filter applied to every proposed action
///
/// Unconditional: confidence is never consulted.
#[derive(Debug, Clone, Copy)]
pub struct Arbiter {
    overbought: f64,
    oversold: f64,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new(70.0, 30.0)
    }
}

impl Arbiter {
    pub fn new(overbought: f64, oversold: f64) -> Self {
        Self {
            overbought,
            oversold,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.rsi_overbought, settings.rsi_oversold)
    }

    /// BUY into RSI above the overbought line or SELL below the oversold line becomes HOLD
    ///
    /// Without an RSI reading the decision passes through.
    pub fn review(&self, instrument: &str, decision: DecisionResult, rsi: Option<f64>) -> Review {
        let Some(rsi) = rsi else {
            return Review {
                decision,
                overridden: None,
            };
        };

        let blocked = match decision.action {
            Action::Buy => rsi > self.overbought,
            Action::Sell => rsi < self.oversold,
            Action::Close | Action::Hold => false,
        };
        if !blocked {
            return Review {
                decision,
                overridden: None,
            };
        }

        let original = decision.action;
        tracing::warn!(
            instrument = %instrument,
            original = %original,
            overridden = %Action::Hold,
            rsi = rsi,
            "🛑 RSI filter blocked {} (RSI {:.1})",
            original,
            rsi
        );

        Review {
            decision: DecisionResult {
                action: Action::Hold,
                rationale: format!("{}{}", decision.rationale, RSI_BLOCK_SUFFIX),
                ..decision
            },
            overridden: Some(original),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(action: Action, confidence: f64) -> DecisionResult {
        DecisionResult {
            action,
            confidence,
            rationale: "setup".to_string(),
            atr: Some(1.0),
            stops: None,
        }
    }

    #[test]
    fn test_overbought_buy_is_held() {
        let arbiter = Arbiter::default();
        for confidence in [0.0, 0.5, 1.0] {
            let review = arbiter.review("XAUUSD", decision(Action::Buy, confidence), Some(75.0));
            assert_eq!(review.decision.action, Action::Hold);
            assert_eq!(review.overridden, Some(Action::Buy));
            assert_eq!(review.decision.rationale, "setup [BLOCKED BY RSI FILTER]");
        }
    }

    #[test]
    fn test_oversold_sell_is_held() {
        let review = Arbiter::default().review("XAUUSD", decision(Action::Sell, 1.0), Some(25.0));
        assert_eq!(review.decision.action, Action::Hold);
        assert_eq!(review.overridden, Some(Action::Sell));
    }

    #[test]
    fn test_neutral_rsi_passes_through() {
        let arbiter = Arbiter::default();
        for action in [Action::Buy, Action::Sell] {
            let review = arbiter.review("XAUUSD", decision(action, 0.9), Some(50.0));
            assert_eq!(review.decision, decision(action, 0.9));
            assert_eq!(review.overridden, None);
        }
    }

    #[test]
    fn test_other_actions_and_missing_rsi() {
        let arbiter = Arbiter::default();
        let review = arbiter.review("XAUUSD", decision(Action::Close, 0.9), Some(90.0));
        assert_eq!(review.decision.action, Action::Close);

        // selling into an overbought market is fine
        let review = arbiter.review("XAUUSD", decision(Action::Sell, 0.9), Some(90.0));
        assert_eq!(review.decision.action, Action::Sell);

        let review = arbiter.review("XAUUSD", decision(Action::Buy, 0.9), None);
        assert_eq!(review.decision.action, Action::Buy);
    }
}
