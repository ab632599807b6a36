//! Configuration file support for pairs backtests.
//!
//! A single TOML file describes the data, the strategy, and the validation
//! runs, so a result can be reproduced from the file alone.

use crate::data::DataConfig;
use crate::engine::BacktestConfig;
use crate::error::{PairsError, Result};
use crate::monte_carlo::MonteCarloConfig;
use crate::signals::VolatilityScaling;
use crate::strategy::{HedgeMethod, StrategyConfig};
use crate::walkforward::WalkForwardConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete pairs configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairsFileConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub hedge: HedgeSettings,
    #[serde(default)]
    pub signal: SignalSettings,
    #[serde(default)]
    pub scaling: ScalingSettings,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub walk_forward: WalkForwardSettings,
    #[serde(default)]
    pub monte_carlo: MonteCarloSettings,
}

/// Price files for the two legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// CSV for the dependent leg (A).
    pub asset_a_path: Option<String>,
    /// CSV for the hedge leg (B).
    pub asset_b_path: Option<String>,
    #[serde(default = "default_asset_a")]
    pub asset_a_name: String,
    #[serde(default = "default_asset_b")]
    pub asset_b_name: String,
    /// Date format in both CSVs.
    pub date_format: Option<String>,
}

fn default_asset_a() -> String { "A".to_string() }
fn default_asset_b() -> String { "B".to_string() }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            asset_a_path: None,
            asset_b_path: None,
            asset_a_name: default_asset_a(),
            asset_b_name: default_asset_b(),
            date_format: None,
        }
    }
}

/// Hedge ratio estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeSettings {
    /// "static" or "rolling".
    #[serde(default = "default_hedge_method")]
    pub method: String,
    /// Trailing window for the rolling method.
    #[serde(default = "default_hedge_window")]
    pub window: usize,
}

fn default_hedge_method() -> String { "static".to_string() }
fn default_hedge_window() -> usize { 60 }

impl Default for HedgeSettings {
    fn default() -> Self {
        Self {
            method: default_hedge_method(),
            window: default_hedge_window(),
        }
    }
}

/// Z-score and threshold settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    #[serde(default = "default_z_window")]
    pub z_window: usize,
    #[serde(default = "default_entry")]
    pub entry_threshold: f64,
    #[serde(default = "default_exit")]
    pub exit_threshold: f64,
    /// Stop-loss level; omitted disables the stop.
    pub max_z: Option<f64>,
}

fn default_z_window() -> usize { 20 }
fn default_entry() -> f64 { 2.0 }
fn default_exit() -> f64 { 0.5 }

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            z_window: default_z_window(),
            entry_threshold: default_entry(),
            exit_threshold: default_exit(),
            max_z: Some(3.0),
        }
    }
}

/// Volatility targeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rolling volatility window; defaults to the z-score window.
    pub vol_window: Option<usize>,
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,
    #[serde(default = "default_max_scale")]
    pub max_scale: f64,
}

fn default_true() -> bool { true }
fn default_min_scale() -> f64 { 0.5 }
fn default_max_scale() -> f64 { 1.5 }

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            vol_window: None,
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
        }
    }
}

/// Walk-forward split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardSettings {
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,
    /// Fixed hedge ratio instead of a train-segment fit.
    pub hedge_ratio: Option<f64>,
}

fn default_train_ratio() -> f64 { 0.7 }

impl Default for WalkForwardSettings {
    fn default() -> Self {
        Self {
            train_ratio: default_train_ratio(),
            hedge_ratio: None,
        }
    }
}

/// Bootstrap stress test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloSettings {
    #[serde(default = "default_simulations")]
    pub num_simulations: usize,
    pub seed: Option<u64>,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_simulations() -> usize { 1000 }
fn default_confidence() -> f64 { 0.95 }

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            num_simulations: default_simulations(),
            seed: None,
            confidence_level: default_confidence(),
            parallel: true,
        }
    }
}

impl PairsFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: PairsFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PairsError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// CSV reader settings for both legs.
    pub fn data_config(&self) -> DataConfig {
        DataConfig {
            date_format: self.data.date_format.clone(),
            ..Default::default()
        }
    }

    /// Build and validate the strategy configuration.
    pub fn to_strategy_config(&self) -> Result<StrategyConfig> {
        let hedge = match self.hedge.method.to_lowercase().as_str() {
            "static" => HedgeMethod::Static,
            "rolling" => HedgeMethod::Rolling {
                window: self.hedge.window,
            },
            other => {
                return Err(PairsError::ConfigError(format!(
                    "unknown hedge method '{}', expected 'static' or 'rolling'",
                    other
                )))
            }
        };

        let scaling = self.scaling.enabled.then(|| VolatilityScaling {
            vol_window: self.scaling.vol_window.unwrap_or(self.signal.z_window),
            min_scale: self.scaling.min_scale,
            max_scale: self.scaling.max_scale,
        });

        let config = StrategyConfig {
            hedge,
            z_window: self.signal.z_window,
            entry_threshold: self.signal.entry_threshold,
            exit_threshold: self.signal.exit_threshold,
            max_z: self.signal.max_z.unwrap_or(f64::INFINITY),
            scaling,
            backtest: self.backtest,
        };
        config
            .validate()
            .map_err(|e| PairsError::ConfigError(e.to_string()))?;
        Ok(config)
    }

    pub fn to_walk_forward_config(&self) -> WalkForwardConfig {
        let config = WalkForwardConfig::new(self.walk_forward.train_ratio);
        match self.walk_forward.hedge_ratio {
            Some(beta) => config.with_hedge_ratio(beta),
            None => config,
        }
    }

    pub fn to_monte_carlo_config(&self) -> MonteCarloConfig {
        let mc = &self.monte_carlo;
        let config = MonteCarloConfig::default()
            .with_simulations(mc.num_simulations)
            .with_confidence(mc.confidence_level)
            .with_parallel(mc.parallel);
        match mc.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Pairs Backtest Configuration File

[data]
asset_a_path = "data/asset_a.csv"
asset_b_path = "data/asset_b.csv"
asset_a_name = "A"
asset_b_name = "B"
# date_format = "%Y-%m-%d"

[hedge]
method = "static"       # or "rolling"
# window = 60           # rolling only

[signal]
z_window = 20
entry_threshold = 2.0
exit_threshold = 0.5
max_z = 3.0             # remove to disable the stop-loss

[scaling]
enabled = true
# vol_window = 20       # defaults to z_window
min_scale = 0.5
max_scale = 1.5

[backtest]
transaction_cost = 0.0
periods_per_year = 252.0

[walk_forward]
train_ratio = 0.7
# hedge_ratio = 1.0     # fixed ratio instead of a train fit

[monte_carlo]
num_simulations = 1000
confidence_level = 0.95
parallel = true
# seed = 42
"#
        .to_string()
    }
}
