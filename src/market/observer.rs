use super::snapshot::{MarketSnapshot, TimeframeView};
use crate::broker::Broker;
use crate::config::Settings;
use crate::error::TradingError;
use crate::indicators::{calculate_rsi, RSI_PERIOD};
use crate::models::Timeframe;
use crate::Result;

/// Fetches multi-timeframe market state for one instrument
#[derive(Debug, Clone)]
pub struct MarketObserver {
    fast: Timeframe,
    slow: Timeframe,
    timeframes: Vec<Timeframe>,
    candle_count: usize,
}

impl MarketObserver {
    pub fn new(fast: Timeframe, slow: Timeframe, context: &[Timeframe], candle_count: usize) -> Self {
        let mut timeframes = vec![fast, slow];
        for tf in context {
            if !timeframes.contains(tf) {
                timeframes.push(*tf);
            }
        }

        Self {
            fast,
            slow,
            timeframes,
            candle_count,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.fast_timeframe,
            settings.slow_timeframe,
            &settings.context_timeframes,
            settings.candle_count,
        )
    }

    /// Build a fresh snapshot, or `DataUnavailable` if anything is missing
    ///
    /// Partial data is never returned: one failed timeframe fails the instrument.
    pub async fn observe(&self, broker: &dyn Broker, instrument: &str) -> Result<MarketSnapshot> {
        let unavailable = |reason: String| TradingError::DataUnavailable {
            instrument: instrument.to_string(),
            reason,
        };

        let mut frames = Vec::with_capacity(self.timeframes.len());
        for &timeframe in &self.timeframes {
            let candles = broker
                .candles(instrument, timeframe, self.candle_count)
                .await
                .map_err(|e| unavailable(e.to_string()))?;

            if candles.len() < 2 {
                return Err(unavailable(format!("{} has no closed candle", timeframe)));
            }
            frames.push(TimeframeView::new(timeframe, candles));
        }

        let quote = broker
            .quote(instrument)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let positions = broker
            .open_positions(instrument)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let (atr, rsi) = match frames.iter().find(|f| f.timeframe == self.fast) {
            Some(fast) => {
                let atr = fast.last_closed().and_then(|(_, values)| values.atr);
                let closes: Vec<f64> = fast.closed_candles().iter().map(|c| c.close).collect();
                (atr, calculate_rsi(&closes, RSI_PERIOD))
            }
            None => (None, None),
        };

        tracing::debug!(
            instrument = %instrument,
            atr = ?atr,
            rsi = ?rsi,
            positions = positions.len(),
            "observed market"
        );

        Ok(MarketSnapshot {
            instrument: instrument.to_string(),
            spread: quote.spread(),
            quote,
            fast_timeframe: self.fast,
            slow_timeframe: self.slow,
            frames,
            positions,
            atr,
            rsi,
        })
    }
}
