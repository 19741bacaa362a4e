/// Average True Range (ATR) indicator
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// ATR here is the plain trailing mean of true range, not Wilder's smoothing.
/// The first bar has no previous close, so its true range is just high - low.
use super::moving_average::sma_series;
use crate::models::Candle;

/// True range for every bar
pub fn true_range_series(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let range = candle.high - candle.low;
            if i == 0 {
                return range;
            }
            let prev_close = candles[i - 1].close;
            range
                .max((candle.high - prev_close).abs())
                .max((candle.low - prev_close).abs())
        })
        .collect()
}

/// ATR aligned with `candles`; the first `period - 1` positions are `None`
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    sma_series(&true_range_series(candles), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let candles = create_test_candles(&[
            (100.0, 101.0, 99.0, 100.0),
            // gap up: high - prev close = 6 beats high - low = 2
            (105.0, 106.0, 104.0, 105.0),
            // gap down: |low - prev close| = 7
            (99.0, 99.5, 98.0, 99.0),
        ]);

        let tr = true_range_series(&candles);
        assert_eq!(tr, vec![2.0, 6.0, 7.0]);
    }

    #[test]
    fn test_atr_low_volatility() {
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0); 15]);
        let atr = atr_series(&candles, 14);

        assert_eq!(atr.len(), 15);
        assert!(atr[..13].iter().all(|v| v.is_none()));
        assert_eq!(atr[13], Some(2.0));
        assert_eq!(atr[14], Some(2.0));
    }

    #[test]
    fn test_atr_is_simple_mean() {
        let mut prices = vec![(100.0, 101.0, 99.0, 100.0); 14];
        prices.push((100.0, 116.0, 100.0, 100.0)); // TR = 16

        let candles = create_test_candles(&prices);
        let atr = atr_series(&candles, 14);

        // window [1..=14]: thirteen 2.0s and one 16.0
        let expected = (13.0 * 2.0 + 16.0) / 14.0;
        assert!((atr[14].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_data() {
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0); 2]);
        assert!(atr_series(&candles, 14).iter().all(|v| v.is_none()));
    }
}
