use crate::indicators::{IndicatorSet, IndicatorValues};
use crate::models::{Candle, Position, Quote, Timeframe};
use std::fmt::Write;

/// Candles and aligned indicators for one timeframe
#[derive(Debug, Clone)]
pub struct TimeframeView {
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSet,
}

impl TimeframeView {
    pub fn new(timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        let indicators = IndicatorSet::compute(&candles);
        Self {
            timeframe,
            candles,
            indicators,
        }
    }

    /// Index of the last fully closed candle (the final element is still forming)
    pub fn last_closed_index(&self) -> Option<usize> {
        self.candles.len().checked_sub(2)
    }

    pub fn last_closed(&self) -> Option<(&Candle, IndicatorValues)> {
        let index = self.last_closed_index()?;
        Some((&self.candles[index], self.indicators.at(index)?))
    }

    /// Every candle except the one still forming
    pub fn closed_candles(&self) -> &[Candle] {
        match self.last_closed_index() {
            Some(index) => &self.candles[..=index],
            None => &[],
        }
    }
}

/// Everything the policies see about one instrument in one cycle
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub instrument: String,
    pub quote: Quote,
    pub spread: f64,
    pub fast_timeframe: Timeframe,
    pub slow_timeframe: Timeframe,
    /// Fast first, then slow, then any context timeframes
    pub frames: Vec<TimeframeView>,
    pub positions: Vec<Position>,
    /// Fast timeframe ATR on the last closed candle
    pub atr: Option<f64>,
    /// Fast timeframe RSI over closed candles
    pub rsi: Option<f64>,
}

impl MarketSnapshot {
    pub fn frame(&self, timeframe: Timeframe) -> Option<&TimeframeView> {
        self.frames.iter().find(|f| f.timeframe == timeframe)
    }

    pub fn fast(&self) -> Option<&TimeframeView> {
        self.frame(self.fast_timeframe)
    }

    pub fn slow(&self) -> Option<&TimeframeView> {
        self.frame(self.slow_timeframe)
    }

    /// Deterministic plain-text rendering for the advisory service
    ///
    /// Fixed field order; prices use `decimals` places, spread always 5.
    pub fn render_text(&self, decimals: usize) -> String {
        let mut analysis = String::new();
        for frame in &self.frames {
            render_frame(&mut analysis, frame, decimals);
        }

        let positions = if self.positions.is_empty() {
            "No open positions.".to_string()
        } else {
            let details: Vec<String> = self
                .positions
                .iter()
                .map(|p| {
                    format!(
                        "{} @ {:.prec$} (PnL: {:.2})",
                        p.direction.as_str(),
                        p.open_price,
                        p.profit,
                        prec = decimals
                    )
                })
                .collect();
            format!("Open Positions:\n{}", details.join("\n"))
        };

        format!(
            "Instrument: {}\nCurrent Price: {:.prec$}\nSpread: {:.5}\n\n--- MULTI-TIMEFRAME ANALYSIS ---\n{}--------------------------------\n\nAccount/Position Status:\n{}",
            self.instrument,
            self.quote.ask,
            self.spread,
            analysis,
            positions,
            prec = decimals
        )
    }
}

fn render_frame(out: &mut String, frame: &TimeframeView, decimals: usize) {
    let Some((candle, values)) = frame.last_closed() else {
        let _ = writeln!(out, "\n[{} Data]\nInsufficient history", frame.timeframe);
        return;
    };

    let trend = if candle.close > values.ema20 { "Above" } else { "Below" };
    let structure = if values.ema20 > values.ema50 { "Bullish" } else { "Bearish" };

    let _ = writeln!(out, "\n[{} Data]", frame.timeframe);
    let _ = writeln!(out, "Close: {:.prec$}", candle.close, prec = decimals);
    let _ = writeln!(
        out,
        "EMA9: {:.prec$} | EMA20: {:.prec$} | EMA50: {:.prec$}",
        values.ema9,
        values.ema20,
        values.ema50,
        prec = decimals
    );
    match values.bollinger {
        Some(band) => {
            let _ = writeln!(
                out,
                "BB: Upper={:.prec$} | Lower={:.prec$} | Width={:.prec$}",
                band.upper,
                band.lower,
                band.width(),
                prec = decimals
            );
        }
        None => {
            let _ = writeln!(out, "BB: n/a");
        }
    }
    let _ = writeln!(out, "Trend: {} EMA20, Structure: {}", trend, structure);
    let status = match values.bollinger {
        Some(band) if band.contains(candle.close) => "Inside",
        Some(_) => "Breakout",
        None => "n/a",
    };
    let _ = writeln!(out, "Range Status: {}", status);
}
