use super::moving_average::{rolling_std, sma_series};

/// One Bollinger band reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBand {
    pub mid: f64,
    pub upper: f64,
    pub lower: f64,
}

impl BollingerBand {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Strictly between the bands
    pub fn contains(&self, price: f64) -> bool {
        self.lower < price && price < self.upper
    }
}

/// SMA(period) of close ± `k` sample standard deviations
pub fn bollinger_series(closes: &[f64], period: usize, k: f64) -> Vec<Option<BollingerBand>> {
    let mids = sma_series(closes, period);
    let stds = rolling_std(closes, period);

    mids.into_iter()
        .zip(stds)
        .map(|(mid, std)| match (mid, std) {
            (Some(mid), Some(std)) => Some(BollingerBand {
                mid,
                upper: mid + k * std,
                lower: mid - k * std,
            }),
            _ => None,
        })
        .collect()
}
