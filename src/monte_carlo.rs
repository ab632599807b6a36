//! Monte Carlo stress testing by i.i.d. bootstrap of realized returns.
//!
//! Each simulation draws `N` returns with replacement from the `N` historical
//! ones, compounds them from one unit of capital, and records the terminal
//! return and the worst drawdown along the path. Resampling point by point
//! discards serial correlation in the returns; that is accepted here.
//!
//! Every simulation owns an RNG seeded from the run seed and its index, so a
//! seeded run gives the same output serially or across threads.
//!
//! # Example
//!
//! ```ignore
//! use pairs_backtest::monte_carlo::{MonteCarloConfig, MonteCarloSimulator};
//!
//! let simulator = MonteCarloSimulator::new(MonteCarloConfig::default().with_seed(42));
//! let result = simulator.simulate(&returns)?;
//! println!("{}", result.summary(0.95)?.summary());
//! ```

use crate::analytics::{equity_curve, max_drawdown};
use crate::error::{PairsError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration for Monte Carlo simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of simulation paths.
    pub num_simulations: usize,
    /// Confidence level for VaR/CVaR (e.g., 0.95 for 95%).
    pub confidence_level: f64,
    /// Random seed for reproducibility (None for random).
    pub seed: Option<u64>,
    /// Spread simulations across the rayon thread pool.
    pub parallel: bool,
    /// Show a progress bar.
    pub show_progress: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1000,
            confidence_level: 0.95,
            seed: None,
            parallel: true,
            show_progress: false,
        }
    }
}

impl MonteCarloConfig {
    /// Set number of simulations.
    pub fn with_simulations(mut self, n: usize) -> Self {
        self.num_simulations = n;
        self
    }

    /// Set confidence level.
    pub fn with_confidence(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// Raw simulation output, one entry per path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    /// Terminal value minus one.
    pub final_returns: Vec<f64>,
    /// Most negative drawdown of each path (`<= 0`).
    pub max_drawdowns: Vec<f64>,
    /// Seed the run was derived from.
    pub seed: u64,
    /// Length of each simulated path.
    pub path_length: usize,
}

impl MonteCarloResult {
    pub fn num_simulations(&self) -> usize {
        self.final_returns.len()
    }

    /// Distribution statistics at `confidence_level`.
    pub fn summary(&self, confidence_level: f64) -> Result<MonteCarloSummary> {
        MonteCarloSummary::from_result(self, confidence_level)
    }
}

/// Distribution statistics of a Monte Carlo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub num_simulations: usize,
    pub confidence_level: f64,
    pub mean_return: f64,
    pub median_return: f64,
    pub return_std: f64,
    /// 5th, 25th, 50th, 75th and 95th percentiles of final returns.
    pub return_percentiles: [f64; 5],
    /// Fraction of paths ending below the starting value.
    pub prob_loss: f64,
    /// Loss not exceeded at the confidence level, as a positive number.
    pub var: f64,
    /// Mean loss beyond VaR, as a positive number.
    pub cvar: f64,
    pub mean_max_drawdown: f64,
    pub median_max_drawdown: f64,
    /// Drawdown exceeded by only `1 - confidence_level` of paths.
    pub worst_max_drawdown: f64,
}

/// Linear-interpolated percentile of sorted data, `p` in [0, 1].
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

impl MonteCarloSummary {
    pub fn from_result(result: &MonteCarloResult, confidence_level: f64) -> Result<Self> {
        if result.final_returns.is_empty() {
            return Err(PairsError::InvalidInput(
                "no simulations to summarize".to_string(),
            ));
        }
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(PairsError::InvalidInput(format!(
                "confidence level must be in (0, 1), got {}",
                confidence_level
            )));
        }

        let mut returns = result.final_returns.clone();
        returns.sort_by(|a, b| a.total_cmp(b));
        let mut drawdowns = result.max_drawdowns.clone();
        drawdowns.sort_by(|a, b| a.total_cmp(b));

        let n = returns.len();
        let mean_return = mean(&returns);
        let return_std = if n > 1 {
            (returns.iter().map(|r| (r - mean_return).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };

        let tail = 1.0 - confidence_level;
        let cutoff = percentile(&returns, tail);
        let beyond: Vec<f64> = returns.iter().copied().filter(|r| *r <= cutoff).collect();

        Ok(Self {
            num_simulations: n,
            confidence_level,
            mean_return,
            median_return: percentile(&returns, 0.5),
            return_std,
            return_percentiles: [0.05, 0.25, 0.5, 0.75, 0.95].map(|p| percentile(&returns, p)),
            prob_loss: returns.iter().filter(|r| **r < 0.0).count() as f64 / n as f64,
            var: -cutoff,
            cvar: -mean(&beyond),
            mean_max_drawdown: mean(&drawdowns),
            median_max_drawdown: percentile(&drawdowns, 0.5),
            worst_max_drawdown: percentile(&drawdowns, tail),
        })
    }

    /// Generate summary report.
    pub fn summary(&self) -> String {
        let [p5, p25, p50, p75, p95] = self.return_percentiles;
        format!(
            r#"Monte Carlo Simulation Results
==============================
Simulations: {}

Final Returns:
  Mean: {:.2}%
  Median: {:.2}%
  Std Dev: {:.2}%
  Percentiles (5/25/50/75/95): {:.2}% / {:.2}% / {:.2}% / {:.2}% / {:.2}%
  P(Loss): {:.1}%

Risk:
  VaR ({}%): {:.2}%
  CVaR: {:.2}%
  Mean Max DD: {:.2}%
  Median Max DD: {:.2}%
  Worst {}% Max DD: {:.2}%"#,
            self.num_simulations,
            self.mean_return * 100.0,
            self.median_return * 100.0,
            self.return_std * 100.0,
            p5 * 100.0,
            p25 * 100.0,
            p50 * 100.0,
            p75 * 100.0,
            p95 * 100.0,
            self.prob_loss * 100.0,
            (self.confidence_level * 100.0).round() as i32,
            self.var * 100.0,
            self.cvar * 100.0,
            self.mean_max_drawdown * 100.0,
            self.median_max_drawdown * 100.0,
            ((1.0 - self.confidence_level) * 100.0).round() as i32,
            self.worst_max_drawdown * 100.0,
        )
    }
}

/// Bootstrap simulator over a realized return series.
pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
}

impl MonteCarloSimulator {
    /// Create a new simulator.
    pub fn new(config: MonteCarloConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Resample `returns` `num_simulations` times.
    pub fn simulate(&self, returns: &[f64]) -> Result<MonteCarloResult> {
        if returns.is_empty() {
            return Err(PairsError::InvalidInput(
                "cannot bootstrap an empty return series".to_string(),
            ));
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(PairsError::InvalidInput(
                "return series contains non-finite values".to_string(),
            ));
        }

        let seed = self
            .config
            .seed
            .unwrap_or_else(|| StdRng::from_entropy().gen());
        let n_sims = self.config.num_simulations;
        info!(
            "Running {} Monte Carlo simulations over {} returns (seed {})",
            n_sims,
            returns.len(),
            seed
        );

        let progress = self.config.show_progress.then(|| {
            let pb = ProgressBar::new(n_sims as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                    .map(|style| style.progress_chars("#>-"))
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        });

        let run_one = |index: usize| {
            let path = simulate_path(returns, path_seed(seed, index));
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            path
        };

        let paths: Vec<(f64, f64)> = if self.config.parallel {
            (0..n_sims).into_par_iter().map(run_one).collect()
        } else {
            (0..n_sims).map(run_one).collect()
        };

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let (final_returns, max_drawdowns) = paths.into_iter().unzip();
        Ok(MonteCarloResult {
            final_returns,
            max_drawdowns,
            seed,
            path_length: returns.len(),
        })
    }
}

/// Seed of path `index`, spread with the 64-bit golden-ratio increment.
fn path_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// One bootstrap path: (final return, max drawdown).
fn simulate_path(returns: &[f64], seed: u64) -> (f64, f64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let sample: Vec<f64> = (0..returns.len())
        .map(|_| returns[rng.gen_range(0..returns.len())])
        .collect();
    let equity = equity_curve(&sample);
    let final_return = equity.last().copied().unwrap_or(1.0) - 1.0;
    (final_return, max_drawdown(&equity))
}
