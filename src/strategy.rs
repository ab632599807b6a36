//! Strategy trait and the z-score pairs strategy.

use crate::analytics::{performance_metrics, PerformanceMetrics};
use crate::cointegration::{compute_spread, estimate_hedge_ratio, estimate_rolling_hedge_ratio};
use crate::engine::{backtest, BacktestConfig, BacktestResult};
use crate::error::{PairsError, Result};
use crate::signals::{
    apply_capped_volatility_scaling, compute_zscore, generate_signals, position_from_signal,
    VolatilityScaling,
};
use crate::types::{AlignedPrices, HedgeRatio, Signal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How the hedge ratio is estimated for a full-sample run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum HedgeMethod {
    /// One OLS fit over the whole sample.
    #[default]
    Static,
    /// Trailing OLS refit at every point.
    Rolling { window: usize },
}

/// Parameters of the z-score pairs strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub hedge: HedgeMethod,
    pub z_window: usize,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    /// Stop-loss level; `f64::INFINITY` disables it.
    pub max_z: f64,
    /// Volatility targeting; `None` trades unit positions.
    pub scaling: Option<VolatilityScaling>,
    pub backtest: BacktestConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            hedge: HedgeMethod::Static,
            z_window: 20,
            entry_threshold: 2.0,
            exit_threshold: 0.5,
            max_z: 3.0,
            scaling: Some(VolatilityScaling::default()),
            backtest: BacktestConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Entry/exit only: no stop-loss, no volatility scaling.
    pub fn basic() -> Self {
        Self {
            max_z: f64::INFINITY,
            scaling: None,
            ..Default::default()
        }
    }

    pub fn with_thresholds(mut self, entry: f64, exit: f64, max_z: f64) -> Self {
        self.entry_threshold = entry;
        self.exit_threshold = exit;
        self.max_z = max_z;
        self
    }

    /// Sets the z-score window. The volatility-scaling window follows it;
    /// call [`with_scaling`](Self::with_scaling) afterwards to set it apart.
    pub fn with_z_window(mut self, window: usize) -> Self {
        self.z_window = window;
        if let Some(scaling) = self.scaling.as_mut() {
            scaling.vol_window = window;
        }
        self
    }

    pub fn with_scaling(mut self, scaling: Option<VolatilityScaling>) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_transaction_cost(mut self, cost: f64) -> Self {
        self.backtest.transaction_cost = cost;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.z_window < 2 {
            return Err(PairsError::InvalidInput(format!(
                "z-score window must be at least 2, got {}",
                self.z_window
            )));
        }
        if let HedgeMethod::Rolling { window } = self.hedge {
            if window < 2 {
                return Err(PairsError::InvalidInput(format!(
                    "rolling hedge window must be at least 2, got {}",
                    window
                )));
            }
        }
        for (name, value) in [
            ("entry threshold", self.entry_threshold),
            ("exit threshold", self.exit_threshold),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PairsError::InvalidInput(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.max_z.is_nan() || self.max_z <= 0.0 {
            return Err(PairsError::InvalidInput(format!(
                "max_z must be positive, got {}",
                self.max_z
            )));
        }
        if let Some(scaling) = &self.scaling {
            scaling.validate()?;
        }
        self.backtest.validate()
    }
}

/// Everything one pass of the pipeline produced, aligned with the prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRun {
    pub hedge_ratio: HedgeRatio,
    pub spread: Vec<Option<f64>>,
    pub zscore: Vec<Option<f64>>,
    pub signals: Vec<Signal>,
    /// Positions after any volatility scaling.
    pub positions: Vec<f64>,
    pub backtest: BacktestResult,
    /// Metrics over the realized returns (all but the first period).
    pub metrics: PerformanceMetrics,
}

impl StrategyRun {
    /// Number of non-flat signals.
    pub fn entry_signals(&self) -> usize {
        self.signals.iter().filter(|s| !s.is_flat()).count()
    }
}

/// A strategy maps a price pair and a hedge ratio to a backtested run.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Hedge ratio fitted on `prices` alone.
    fn estimate_hedge(&self, prices: &AlignedPrices) -> Result<HedgeRatio>;

    /// Run the pipeline on `prices` with a given hedge ratio.
    fn run_with_hedge(&self, prices: &AlignedPrices, hedge_ratio: &HedgeRatio) -> Result<StrategyRun>;

    /// Estimate the hedge ratio on `prices` and run on the same sample.
    fn run(&self, prices: &AlignedPrices) -> Result<StrategyRun> {
        let hedge = self.estimate_hedge(prices)?;
        self.run_with_hedge(prices, &hedge)
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![]
    }
}

/// Mean-reversion strategy on the z-score of `a - beta * b`.
#[derive(Debug, Clone, Default)]
pub struct PairsStrategy {
    config: StrategyConfig,
}

impl PairsStrategy {
    pub fn new(config: StrategyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }
}

impl Strategy for PairsStrategy {
    fn name(&self) -> &str {
        "zscore-pairs"
    }

    fn estimate_hedge(&self, prices: &AlignedPrices) -> Result<HedgeRatio> {
        let hedge = match self.config.hedge {
            HedgeMethod::Static => {
                HedgeRatio::Static(estimate_hedge_ratio(prices.a(), prices.b())?)
            }
            HedgeMethod::Rolling { window } => HedgeRatio::Rolling(
                estimate_rolling_hedge_ratio(prices.a(), prices.b(), window)?,
            ),
        };
        if let HedgeRatio::Static(beta) = hedge {
            info!("Estimated hedge ratio {:.4} on {} points", beta, prices.len());
        }
        Ok(hedge)
    }

    fn run_with_hedge(&self, prices: &AlignedPrices, hedge_ratio: &HedgeRatio) -> Result<StrategyRun> {
        let cfg = &self.config;

        let spread = compute_spread(prices.a(), prices.b(), hedge_ratio)?;
        let zscore = compute_zscore(&spread, cfg.z_window)?;
        let signals = generate_signals(&zscore, cfg.entry_threshold, cfg.exit_threshold, cfg.max_z);
        let raw_positions = position_from_signal(&signals);
        let positions = match &cfg.scaling {
            Some(scaling) => apply_capped_volatility_scaling(&raw_positions, &spread, scaling)?,
            None => raw_positions,
        };

        let result = backtest(prices, &positions, hedge_ratio, cfg.backtest.transaction_cost)?;
        let metrics = performance_metrics(result.realized_returns(), cfg.backtest.periods_per_year)?;
        debug!(
            "{}: {} periods, total return {:.4}",
            self.name(),
            result.len(),
            metrics.total_return
        );

        Ok(StrategyRun {
            hedge_ratio: hedge_ratio.clone(),
            spread,
            zscore,
            signals,
            positions,
            backtest: result,
            metrics,
        })
    }

    fn parameters(&self) -> Vec<(String, String)> {
        let cfg = &self.config;
        let mut params = vec![
            ("hedge".to_string(), format!("{:?}", cfg.hedge)),
            ("z_window".to_string(), cfg.z_window.to_string()),
            ("entry".to_string(), cfg.entry_threshold.to_string()),
            ("exit".to_string(), cfg.exit_threshold.to_string()),
            ("max_z".to_string(), cfg.max_z.to_string()),
            (
                "transaction_cost".to_string(),
                cfg.backtest.transaction_cost.to_string(),
            ),
        ];
        if let Some(s) = &cfg.scaling {
            params.push((
                "scaling".to_string(),
                format!("window {} in [{}, {}]", s.vol_window, s.min_scale, s.max_scale),
            ));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oscillating_pair(n: usize) -> AlignedPrices {
        let b: Vec<f64> = (0..n).map(|i| 50.0 + (i as f64 * 0.05).sin() * 5.0).collect();
        let a: Vec<f64> = b
            .iter()
            .enumerate()
            .map(|(i, pb)| 2.0 * pb + (i as f64 * 0.7).sin() * 0.8)
            .collect();
        AlignedPrices::from_values(a, b).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(StrategyConfig::default().validate().is_ok());
        assert!(StrategyConfig::basic().validate().is_ok());
        assert!(StrategyConfig::default().with_z_window(1).validate().is_err());
        assert!(StrategyConfig::default()
            .with_thresholds(-1.0, 0.5, 3.0)
            .validate()
            .is_err());
        assert!(StrategyConfig::default()
            .with_thresholds(2.0, 0.5, f64::NAN)
            .validate()
            .is_err());
        assert!(PairsStrategy::new(StrategyConfig::default().with_transaction_cost(-0.1)).is_err());
    }

    #[test]
    fn test_z_window_carries_vol_window() {
        let config = StrategyConfig::default().with_z_window(30);
        assert_eq!(config.z_window, 30);
        assert_eq!(config.scaling.map(|s| s.vol_window), Some(30));

        let config = StrategyConfig::basic().with_z_window(30);
        assert!(config.scaling.is_none());

        let split = StrategyConfig::default()
            .with_z_window(30)
            .with_scaling(Some(VolatilityScaling {
                vol_window: 10,
                ..VolatilityScaling::default()
            }));
        assert_eq!(split.z_window, 30);
        assert_eq!(split.scaling.map(|s| s.vol_window), Some(10));
    }

    #[test]
    fn test_pipeline_shapes() {
        let prices = oscillating_pair(200);
        let strategy = PairsStrategy::new(StrategyConfig::default()).unwrap();
        let run = strategy.run(&prices).unwrap();

        assert_eq!(run.spread.len(), 200);
        assert_eq!(run.zscore.len(), 200);
        assert_eq!(run.positions.len(), 200);
        assert_eq!(run.backtest.len(), 200);
        assert_eq!(run.metrics.observations, 199);
        assert!(run.zscore[..19].iter().all(|z| z.is_none()));
        assert!(run.positions.iter().all(|p| p.abs() <= 1.5));
        assert!(matches!(run.hedge_ratio, HedgeRatio::Static(beta) if (beta - 2.0).abs() < 0.1));
    }

    #[test]
    fn test_basic_config_trades_unit_positions() {
        let prices = oscillating_pair(200);
        let strategy = PairsStrategy::new(StrategyConfig::basic().with_thresholds(1.0, 0.2, f64::INFINITY))
            .unwrap();
        let run = strategy.run(&prices).unwrap();
        assert!(run.entry_signals() > 0);
        assert!(run.positions.iter().all(|p| [-1.0, 0.0, 1.0].contains(p)));
    }

    #[test]
    fn test_rolling_hedge_pipeline() {
        let prices = oscillating_pair(150);
        let config = StrategyConfig {
            hedge: HedgeMethod::Rolling { window: 40 },
            ..StrategyConfig::basic()
        };
        let run = PairsStrategy::new(config).unwrap().run(&prices).unwrap();
        assert!(run.spread[..40].iter().all(|s| s.is_none()));
        // z needs a full window of defined spread.
        assert!(run.zscore[..59].iter().all(|z| z.is_none()));
        assert!(run.positions[..59].iter().all(|p| *p == 0.0));
    }

    #[test]
    fn test_parameters_listed() {
        let strategy = PairsStrategy::default();
        let params = strategy.parameters();
        assert!(params.iter().any(|(k, _)| k == "z_window"));
        assert!(params.iter().any(|(k, _)| k == "scaling"));
    }
}
