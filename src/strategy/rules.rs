use super::SignalPolicy;
use crate::market::{MarketSnapshot, TimeframeView};
use crate::models::{Action, Candle, DecisionResult, StopDistances};
use async_trait::async_trait;
use std::fmt;

/// Closed candles scanned for the range high/low
pub const BREAKOUT_WINDOW: usize = 20;
/// A pullback "touch" also counts when within this many ATRs of EMA20
pub const PULLBACK_TOUCH_ATR: f64 = 0.2;
pub const RULE_STOP_LOSS_ATR: f64 = 2.0;
pub const RULE_TAKE_PROFIT_ATR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendBias {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for TrendBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendBias::Bullish => "BULLISH",
            TrendBias::Bearish => "BEARISH",
            TrendBias::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// Last closed candle of a timeframe with the indicator values the rules read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub ema20: f64,
    pub ema50: f64,
    pub atr: Option<f64>,
}

impl ClosedBar {
    pub fn from_view(view: &TimeframeView) -> Option<Self> {
        let (candle, values) = view.last_closed()?;
        Some(Self {
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            ema20: values.ema20,
            ema50: values.ema50,
            atr: values.atr,
        })
    }
}

/// Trend bias of the slow timeframe's last closed candle
pub fn classify_bias(bar: &ClosedBar) -> TrendBias {
    if bar.ema20 > bar.ema50 && bar.close > bar.ema20 {
        TrendBias::Bullish
    } else if bar.ema20 < bar.ema50 && bar.close < bar.ema20 {
        TrendBias::Bearish
    } else {
        TrendBias::Neutral
    }
}

/// EMA20 pullback with a candle body in the trend direction
pub fn evaluate_pullback(bias: TrendBias, bar: &ClosedBar) -> Option<Action> {
    let atr = bar.atr.filter(|a| *a > 0.0)?;
    let near = PULLBACK_TOUCH_ATR * atr;

    match bias {
        TrendBias::Bullish => {
            let touched = bar.low <= bar.ema20 || (bar.low - bar.ema20).abs() < near;
            (touched && bar.close > bar.open).then_some(Action::Buy)
        }
        TrendBias::Bearish => {
            let touched = bar.high >= bar.ema20 || (bar.high - bar.ema20).abs() < near;
            (touched && bar.close < bar.open).then_some(Action::Sell)
        }
        TrendBias::Neutral => None,
    }
}

fn breaks_above(candles: &[Candle], index: usize) -> bool {
    let window = &candles[index - BREAKOUT_WINDOW..index];
    let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    candles[index].close > high
}

fn breaks_below(candles: &[Candle], index: usize) -> bool {
    let window = &candles[index - BREAKOUT_WINDOW..index];
    let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    candles[index].close < low
}

/// Edge-triggered range breakout on the last element of `closed`
///
/// `closed` must exclude the forming candle. Each bar is compared against the
/// 20 closed bars before it, so a breakout fires only on the first bar that
/// clears the range.
pub fn evaluate_breakout(closed: &[Candle], atr: Option<f64>) -> Option<Action> {
    atr.filter(|a| *a > 0.0)?;
    if closed.len() < BREAKOUT_WINDOW + 2 {
        return None;
    }

    let last = closed.len() - 1;
    if breaks_above(closed, last) && !breaks_above(closed, last - 1) {
        return Some(Action::Buy);
    }
    if breaks_below(closed, last) && !breaks_below(closed, last - 1) {
        return Some(Action::Sell);
    }
    None
}

fn rule_stops(atr: f64) -> StopDistances {
    StopDistances {
        stop_loss: RULE_STOP_LOSS_ATR * atr,
        take_profit: RULE_TAKE_PROFIT_ATR * atr,
    }
}

/// Deterministic multi-timeframe pullback / breakout policy
///
/// Pullback is checked first; at most one decision per instrument per cycle.
#[derive(Debug, Clone, Default)]
pub struct RulePolicy;

impl RulePolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> DecisionResult {
        let (Some(fast), Some(slow)) = (snapshot.fast(), snapshot.slow()) else {
            return DecisionResult::hold("Missing fast or slow timeframe");
        };
        let (Some(fast_bar), Some(slow_bar)) = (ClosedBar::from_view(fast), ClosedBar::from_view(slow)) else {
            return DecisionResult::hold("No closed candle yet");
        };

        let bias = classify_bias(&slow_bar);

        if let Some(action) = evaluate_pullback(bias, &fast_bar) {
            let atr = fast_bar.atr.unwrap_or_default();
            return DecisionResult {
                action,
                confidence: 1.0,
                rationale: format!(
                    "Trend pullback: {} {} bias, {} bar touched EMA20 {:.5}",
                    slow.timeframe, bias, fast.timeframe, fast_bar.ema20
                ),
                atr: Some(atr),
                stops: Some(rule_stops(atr)),
            };
        }

        if let Some(action) = evaluate_breakout(slow.closed_candles(), slow_bar.atr) {
            let atr = slow_bar.atr.unwrap_or_default();
            return DecisionResult {
                action,
                confidence: 1.0,
                rationale: format!(
                    "Range breakout: {} close {:.5} cleared the {}-bar range",
                    slow.timeframe, slow_bar.close, BREAKOUT_WINDOW
                ),
                atr: Some(atr),
                stops: Some(rule_stops(atr)),
            };
        }

        DecisionResult::hold(format!("No rule triggered ({} bias)", bias))
    }
}

#[async_trait]
impl SignalPolicy for RulePolicy {
    async fn decide(&self, snapshot: &MarketSnapshot) -> DecisionResult {
        self.evaluate(snapshot)
    }

    fn name(&self) -> &str {
        "rules"
    }
}
