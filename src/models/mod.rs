use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV candlestick, oldest first in every series.
///
/// The last element of a fetched series is the bar that is still forming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chart timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "H1" => Ok(Timeframe::H1),
            other => Err(format!("unknown timeframe: {}", other)),
        }
    }
}

/// Current bid/ask quote
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Side of an open position or market order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }

    /// Price at which a new order in this direction fills (ask for longs, bid for shorts)
    pub fn entry_price(&self, quote: &Quote) -> f64 {
        match self {
            Direction::Long => quote.ask,
            Direction::Short => quote.bid,
        }
    }

    /// Price at which an existing position in this direction is closed
    pub fn exit_price(&self, quote: &Quote) -> f64 {
        match self {
            Direction::Long => quote.bid,
            Direction::Short => quote.ask,
        }
    }
}

/// Open position as reported by the broker
///
/// A stop-loss or take-profit of `0.0` means "not set" (broker convention).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub instrument: String,
    pub direction: Direction,
    pub volume: f64,
    pub open_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub profit: f64,
    pub ticket: u64,
}

impl Position {
    pub fn has_stop_loss(&self) -> bool {
        self.stop_loss > 0.0
    }

    /// Signed price difference if closed at `close_price` (positive = win)
    pub fn price_diff(&self, close_price: f64) -> f64 {
        match self.direction {
            Direction::Long => close_price - self.open_price,
            Direction::Short => self.open_price - close_price,
        }
    }
}

/// Proposed action out of a signal policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Close,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Close => "CLOSE",
            Action::Hold => "HOLD",
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Action::Buy => Some(Direction::Long),
            Action::Sell => Some(Direction::Short),
            Action::Close | Action::Hold => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "CLOSE" => Ok(Action::Close),
            "HOLD" => Ok(Action::Hold),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// Stop-loss / take-profit distances in price units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopDistances {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Output of a signal policy, consumed immediately by the arbiter
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResult {
    pub action: Action,
    pub confidence: f64,
    pub rationale: String,
    /// Volatility at decision time (fast timeframe ATR unless the policy says otherwise)
    pub atr: Option<f64>,
    /// Policy-specific stop distances; `None` means the configured ATR multipliers apply
    pub stops: Option<StopDistances>,
}

impl DecisionResult {
    pub fn hold(rationale: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            rationale: rationale.into(),
            atr: None,
            stops: None,
        }
    }
}

/// Market order ready for submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Contract properties needed for sizing and static stop fallbacks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSpec {
    pub point: f64,
    pub volume_step: f64,
    pub min_volume: f64,
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self {
            point: 0.01,
            volume_step: 0.01,
            min_volume: 0.01,
        }
    }
}
