use thiserror::Error;

/// Failure reported by the broker collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    #[error("{what} unavailable")]
    Unavailable { what: String },

    #[error("rejected by broker (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed broker response: {0}")]
    Decode(String),
}

/// Error taxonomy of the trading core
#[derive(Debug, Error)]
pub enum TradingError {
    /// Missing candles or tick; the instrument is skipped this cycle
    #[error("no market data for {instrument}: {reason}")]
    DataUnavailable { instrument: String, reason: String },

    /// Advisory service failed; always mapped to a HOLD before leaving the policy
    #[error("advisory failure: {0}")]
    AdvisoryFailure(String),

    #[error("order rejected for {instrument}: {reason}")]
    OrderRejected { instrument: String, reason: String },

    #[error("stop modification rejected for ticket {ticket}: {reason}")]
    ModificationRejected { ticket: u64, reason: String },

    /// Normal refusal, not a fault
    #[error("{instrument} already holds {open} of {max} allowed positions")]
    CapacityExceeded {
        instrument: String,
        open: usize,
        max: usize,
    },

    /// Fatal for the running instance
    #[error("equity guard triggered: drawdown {drawdown_pct:.2}% >= limit {limit_pct:.2}%")]
    EquityGuardTriggered { drawdown_pct: f64, limit_pct: f64 },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TradingError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TradingError::EquityGuardTriggered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_equity_guard_is_fatal() {
        let halt = TradingError::EquityGuardTriggered {
            drawdown_pct: 3.0,
            limit_pct: 2.0,
        };
        assert!(halt.is_fatal());
        assert!(halt.to_string().contains("3.00%"));

        let refused = TradingError::CapacityExceeded {
            instrument: "XAUUSD".to_string(),
            open: 1,
            max: 1,
        };
        assert!(!refused.is_fatal());

        let broker: TradingError = BrokerError::Transport("reset".to_string()).into();
        assert!(!broker.is_fatal());
        assert_eq!(broker.to_string(), "transport error: reset");
    }
}
