use crate::config::{Settings, SizingConfig, StopConfig};
use crate::error::TradingError;
use crate::models::{DecisionResult, Direction, InstrumentSpec, OrderRequest, Quote, StopDistances};
use crate::Result;

/// Confidence band that selects the lot multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingTier {
    Base,
    High,
    Max,
}

impl SizingTier {
    pub fn multiplier(&self, config: &SizingConfig) -> f64 {
        match self {
            SizingTier::Base => 1.0,
            SizingTier::High => config.high_multiplier,
            SizingTier::Max => config.max_multiplier,
        }
    }
}

pub fn sizing_tier(confidence: f64, config: &SizingConfig) -> SizingTier {
    if confidence >= config.max_confidence {
        SizingTier::Max
    } else if confidence >= config.high_confidence {
        SizingTier::High
    } else {
        SizingTier::Base
    }
}

/// ATR-scaled stop and target distances with static point fallbacks
#[derive(Debug, Clone)]
pub struct StopCalculator {
    config: StopConfig,
}

impl StopCalculator {
    pub fn new(config: StopConfig) -> Self {
        Self { config }
    }

    pub fn distances(&self, atr: Option<f64>, spec: &InstrumentSpec) -> StopDistances {
        match atr.filter(|a| a.is_finite() && *a > 0.0) {
            Some(atr) => StopDistances {
                stop_loss: self.config.sl_atr_multiplier * atr,
                take_profit: self.config.tp_atr_multiplier * atr,
            },
            None => StopDistances {
                stop_loss: self.config.fallback_sl_points * spec.point,
                take_profit: self.config.fallback_tp_points * spec.point,
            },
        }
    }
}

/// Turns an approved decision into a concrete market order
///
/// Shared by both policies so every entry gets the same risk treatment.
/// Volume = base lot x confidence tier x instrument class, then rounded down
/// to the broker's volume step and clamped.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    sizing: SizingConfig,
    stops: StopCalculator,
    max_open_trades: usize,
}

impl PositionSizer {
    pub fn new(sizing: SizingConfig, stops: StopConfig, max_open_trades: usize) -> Self {
        Self {
            sizing,
            stops: StopCalculator::new(stops),
            max_open_trades,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.sizing.clone(),
            settings.stops.clone(),
            settings.max_open_trades,
        )
    }

    /// First configured pattern contained in the instrument name, else 1.0
    pub fn instrument_multiplier(&self, instrument: &str) -> f64 {
        let name = instrument.to_uppercase();
        self.sizing
            .instrument_multipliers
            .iter()
            .find(|(pattern, _)| name.contains(&pattern.to_uppercase()))
            .map(|(_, multiplier)| *multiplier)
            .unwrap_or(1.0)
    }

    pub fn volume_for(&self, instrument: &str, confidence: f64, spec: &InstrumentSpec) -> f64 {
        let tier = sizing_tier(confidence, &self.sizing);
        let raw = self.sizing.base_lot * tier.multiplier(&self.sizing) * self.instrument_multiplier(instrument);

        let mut volume = if spec.volume_step > 0.0 {
            // tolerance keeps 2.0 / 0.01 from flooring to 199
            (raw / spec.volume_step + 1e-9).floor() * spec.volume_step
        } else {
            raw
        };
        volume = volume.max(spec.min_volume);
        if let Some(max) = self.sizing.max_volume {
            volume = volume.min(max);
        }

        round_volume(volume)
    }

    /// Refuse a new entry once the instrument holds `max_open_trades` positions
    pub fn check_capacity(&self, instrument: &str, open: usize) -> Result<()> {
        if open >= self.max_open_trades {
            return Err(TradingError::CapacityExceeded {
                instrument: instrument.to_string(),
                open,
                max: self.max_open_trades,
            });
        }
        Ok(())
    }

    /// Entry at the ask for longs and the bid for shorts, never the mid
    pub fn build_order(
        &self,
        instrument: &str,
        direction: Direction,
        decision: &DecisionResult,
        quote: &Quote,
        spec: &InstrumentSpec,
    ) -> OrderRequest {
        let distances = decision
            .stops
            .unwrap_or_else(|| self.stops.distances(decision.atr, spec));
        let entry_price = direction.entry_price(quote);

        let (stop_loss, take_profit) = match direction {
            Direction::Long => (entry_price - distances.stop_loss, entry_price + distances.take_profit),
            Direction::Short => (entry_price + distances.stop_loss, entry_price - distances.take_profit),
        };

        OrderRequest {
            instrument: instrument.to_string(),
            direction,
            volume: self.volume_for(instrument, decision.confidence, spec),
            entry_price,
            stop_loss,
            take_profit,
        }
    }
}

fn round_volume(volume: f64) -> f64 {
    (volume * 1e8).round() / 1e8
}
