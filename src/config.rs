use crate::models::Timeframe;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/trader.toml";
const ENV_PREFIX: &str = "TRADER";

/// Which signal policy drives new entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Rules,
    Advisory,
}

/// Confidence-tiered lot sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub base_lot: f64,
    /// Confidence at which the intermediate tier starts
    pub high_confidence: f64,
    pub high_multiplier: f64,
    /// Confidence at which the top tier starts
    pub max_confidence: f64,
    pub max_multiplier: f64,
    /// Substring of the instrument name → extra multiplier (e.g. "BTC" → 2.0)
    pub instrument_multipliers: BTreeMap<String, f64>,
    pub max_volume: Option<f64>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_lot: 1.0,
            high_confidence: 0.80,
            high_multiplier: 2.0,
            max_confidence: 0.90,
            max_multiplier: 3.0,
            instrument_multipliers: BTreeMap::from([("BTC".to_string(), 2.0)]),
            max_volume: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub sl_atr_multiplier: f64,
    pub tp_atr_multiplier: f64,
    /// Used when ATR is zero or unavailable, in instrument points
    pub fallback_sl_points: f64,
    pub fallback_tp_points: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            sl_atr_multiplier: 1.5,
            tp_atr_multiplier: 2.0,
            fallback_sl_points: 50.0,
            fallback_tp_points: 80.0,
        }
    }
}

/// Break-even and trailing stop thresholds, all in ATR units
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub break_even_trigger_atr: f64,
    pub trailing_trigger_atr: f64,
    pub trailing_distance_atr: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            break_even_trigger_atr: 0.5,
            trailing_trigger_atr: 1.0,
            trailing_distance_atr: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub url: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/generate".to_string(),
            model: "llama3".to_string(),
            temperature: 0.2,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Base URL of the broker REST bridge
    pub url: String,
    pub timeout_secs: u64,
    /// Keep orders in memory, reading market data from the bridge
    pub paper: bool,
    /// Starting balance of the paper account
    pub paper_balance: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8765".to_string(),
            timeout_secs: 10,
            paper: false,
            paper_balance: 10_000.0,
        }
    }
}

/// Process-wide settings, loaded once at startup and never mutated
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub instruments: Vec<String>,
    pub cycle_interval_secs: u64,
    pub candle_count: usize,
    /// Entry timeframe
    pub fast_timeframe: Timeframe,
    /// Trend-bias and breakout timeframe
    pub slow_timeframe: Timeframe,
    /// Extra timeframes rendered for the advisory service only
    pub context_timeframes: Vec<Timeframe>,
    pub policy: PolicyKind,
    pub sizing: SizingConfig,
    pub stops: StopConfig,
    pub risk: RiskConfig,
    pub max_open_trades: usize,
    pub max_drawdown_pct: f64,
    pub reset_equity_daily: bool,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub advisory: AdvisoryConfig,
    pub broker: BrokerConfig,
    pub journal_path: String,
    pub display_decimals: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instruments: vec!["XAUUSD".to_string(), "BTCUSD".to_string()],
            cycle_interval_secs: 60,
            candle_count: 100,
            fast_timeframe: Timeframe::M1,
            slow_timeframe: Timeframe::M5,
            context_timeframes: vec![Timeframe::M15],
            policy: PolicyKind::Advisory,
            sizing: SizingConfig::default(),
            stops: StopConfig::default(),
            risk: RiskConfig::default(),
            max_open_trades: 1,
            max_drawdown_pct: 10.0,
            reset_equity_daily: true,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            advisory: AdvisoryConfig::default(),
            broker: BrokerConfig::default(),
            journal_path: "logs/trade_journal.jsonl".to_string(),
            display_decimals: 2,
        }
    }
}

impl Settings {
    /// Defaults, then the optional TOML file, then `TRADER_*` environment variables
    ///
    /// Nested keys use a double underscore: `TRADER_SIZING__BASE_LOT=0.5`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("instruments")
                    .with_list_parse_key("context_timeframes"),
            )
            .build()
            .with_context(|| format!("failed to read settings from {}", path.display()))?
            .try_deserialize()
            .context("invalid settings")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.instruments.is_empty() {
            bail!("at least one instrument must be configured");
        }
        if self.candle_count < 100 {
            bail!("candle_count must be at least 100 (got {})", self.candle_count);
        }
        if self.cycle_interval_secs == 0 {
            bail!("cycle_interval_secs must be positive");
        }
        if self.fast_timeframe == self.slow_timeframe {
            bail!("fast and slow timeframes must differ");
        }
        if self.max_open_trades == 0 {
            bail!("max_open_trades must be at least 1");
        }
        if self.max_drawdown_pct <= 0.0 {
            bail!("max_drawdown_pct must be positive");
        }
        if self.advisory.timeout_secs == 0 || self.broker.timeout_secs == 0 {
            bail!("request timeouts must be positive");
        }

        let sizing = &self.sizing;
        for (name, value) in [
            ("sizing.base_lot", sizing.base_lot),
            ("sizing.high_multiplier", sizing.high_multiplier),
            ("sizing.max_multiplier", sizing.max_multiplier),
            ("stops.sl_atr_multiplier", self.stops.sl_atr_multiplier),
            ("stops.tp_atr_multiplier", self.stops.tp_atr_multiplier),
            ("stops.fallback_sl_points", self.stops.fallback_sl_points),
            ("stops.fallback_tp_points", self.stops.fallback_tp_points),
            ("risk.trailing_distance_atr", self.risk.trailing_distance_atr),
        ] {
            if value <= 0.0 {
                bail!("{} must be positive (got {})", name, value);
            }
        }
        for (pattern, multiplier) in &sizing.instrument_multipliers {
            if *multiplier <= 0.0 {
                bail!("instrument multiplier for {} must be positive", pattern);
            }
        }
        for (name, value) in [
            ("sizing.high_confidence", sizing.high_confidence),
            ("sizing.max_confidence", sizing.max_confidence),
        ] {
            if value <= 0.0 || value > 1.0 {
                bail!("{} must be in (0, 1] (got {})", name, value);
            }
        }
        if sizing.high_confidence > sizing.max_confidence {
            bail!("sizing.high_confidence must not exceed sizing.max_confidence");
        }
        if sizing.high_multiplier > sizing.max_multiplier {
            bail!("sizing tiers must be monotonic: high_multiplier > max_multiplier");
        }
        if self.risk.break_even_trigger_atr > self.risk.trailing_trigger_atr {
            bail!("risk.break_even_trigger_atr must not exceed risk.trailing_trigger_atr");
        }
        if self.rsi_oversold >= self.rsi_overbought {
            bail!("rsi_oversold must be below rsi_overbought");
        }

        Ok(())
    }
}
