// Technical indicators module
// EMA, ATR, Bollinger Bands and RSI over ordered candle series

pub mod atr;
pub mod bollinger;
pub mod moving_average;
pub mod rsi;

pub use atr::{atr_series, true_range_series};
pub use bollinger::{bollinger_series, BollingerBand};
pub use moving_average::{ema_series, rolling_std, sma_series};
pub use rsi::calculate_rsi;

use crate::models::Candle;

pub const ATR_PERIOD: usize = 14;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_K: f64 = 2.0;
pub const RSI_PERIOD: usize = 14;

/// Indicator values at one candle position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorValues {
    pub ema9: f64,
    pub ema20: f64,
    pub ema50: f64,
    /// `None` before the ATR lookback is filled
    pub atr: Option<f64>,
    /// `None` before the Bollinger lookback is filled
    pub bollinger: Option<BollingerBand>,
}

/// Indicator series for one timeframe, index-aligned with the candles
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub ema9: Vec<f64>,
    pub ema20: Vec<f64>,
    pub ema50: Vec<f64>,
    pub atr: Vec<Option<f64>>,
    pub bollinger: Vec<Option<BollingerBand>>,
}

impl IndicatorSet {
    pub fn compute(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        Self {
            ema9: ema_series(&closes, 9),
            ema20: ema_series(&closes, 20),
            ema50: ema_series(&closes, 50),
            atr: atr_series(candles, ATR_PERIOD),
            bollinger: bollinger_series(&closes, BOLLINGER_PERIOD, BOLLINGER_K),
        }
    }

    pub fn len(&self) -> usize {
        self.ema20.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ema20.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<IndicatorValues> {
        if index >= self.len() {
            return None;
        }

        Some(IndicatorValues {
            ema9: self.ema9[index],
            ema20: self.ema20[index],
            ema50: self.ema50[index],
            atr: self.atr[index],
            bollinger: self.bollinger[index],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trending_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                Candle {
                    timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                    open: base - 0.2,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base,
                    volume: 10.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_lookback_positions_are_flagged() {
        let set = IndicatorSet::compute(&trending_candles(60));

        assert_eq!(set.len(), 60);
        for i in 0..13 {
            assert!(set.at(i).unwrap().atr.is_none(), "atr defined at {}", i);
        }
        for i in 13..60 {
            assert!(set.at(i).unwrap().atr.unwrap() >= 0.0);
        }
        for i in 0..19 {
            assert!(set.at(i).unwrap().bollinger.is_none(), "bb defined at {}", i);
        }
        assert!(set.at(19).unwrap().bollinger.is_some());
        assert!(set.at(60).is_none());
    }

    #[test]
    fn test_ema_ordering_in_uptrend() {
        let set = IndicatorSet::compute(&trending_candles(80));
        let last = set.at(79).unwrap();

        assert!(last.ema9 > last.ema20);
        assert!(last.ema20 > last.ema50);
    }
}
