/// Exponential moving average over the whole series
///
/// `EMA[0] = price[0]`, then `EMA[i] = price[i] * k + EMA[i-1] * (1 - k)` with
/// `k = 2 / (span + 1)`. Every position is defined, no look-ahead.
pub fn ema_series(prices: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(prices.len());
    let Some(&first) = prices.first() else {
        return out;
    };

    let k = 2.0 / (span as f64 + 1.0);
    let mut ema = first;
    out.push(ema);
    for &price in &prices[1..] {
        ema = price * k + ema * (1.0 - k);
        out.push(ema);
    }

    out
}

/// Trailing simple moving average; `None` until `period` values are available
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            Some(window.iter().sum::<f64>() / period as f64)
        })
        .collect()
}

/// Trailing sample standard deviation (n - 1 denominator)
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}
