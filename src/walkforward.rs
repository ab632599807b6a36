//! Walk-forward validation of the pairs strategy.
//!
//! The aligned history is split once, chronologically, into a train segment
//! and a later test segment. The hedge ratio is fitted on the train segment
//! only (or supplied up front) and reused unchanged on both segments, each of
//! which then runs the full strategy pipeline on its own. Both results are
//! reported side by side; judging whether out-of-sample performance holds up
//! is left to the caller.

use crate::analytics::PerformanceMetrics;
use crate::cointegration::estimate_hedge_ratio;
use crate::error::{PairsError, Result};
use crate::strategy::{Strategy, StrategyRun};
use crate::types::{AlignedPrices, HedgeRatio};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Where the hedge ratio used on both segments comes from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum HedgeSource {
    /// OLS on the train segment.
    #[default]
    EstimateOnTrain,
    /// A ratio fixed before the split, never fitted on test data.
    Fixed(f64),
}

/// Configuration for walk-forward validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Fraction of points in the train segment.
    pub train_ratio: f64,
    pub hedge: HedgeSource,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            hedge: HedgeSource::EstimateOnTrain,
        }
    }
}

impl WalkForwardConfig {
    pub fn new(train_ratio: f64) -> Self {
        Self {
            train_ratio,
            ..Default::default()
        }
    }

    /// Use a fixed hedge ratio instead of fitting one on the train segment.
    pub fn with_hedge_ratio(mut self, beta: f64) -> Self {
        self.hedge = HedgeSource::Fixed(beta);
        self
    }
}

/// Split `prices` by position: points before `floor(len * train_ratio)` train,
/// the rest test.
pub fn walk_forward_split(
    prices: &AlignedPrices,
    train_ratio: f64,
) -> Result<(AlignedPrices, AlignedPrices)> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(PairsError::InvalidInput(format!(
            "train ratio must be in (0, 1), got {}",
            train_ratio
        )));
    }
    let len = prices.len();
    let split = (len as f64 * train_ratio).floor() as usize;
    if split == 0 || split == len {
        return Err(PairsError::InvalidInput(format!(
            "{} points at ratio {} leave an empty segment",
            len, train_ratio
        )));
    }
    Ok((prices.slice(0..split)?, prices.slice(split..len)?))
}

/// Outcome of the pipeline on one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResult {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Number of price points in the segment.
    pub len: usize,
    /// Realized returns (the first point of the segment has none).
    pub returns: Vec<f64>,
    pub equity_curve: Vec<f64>,
    pub positions: Vec<f64>,
    pub metrics: PerformanceMetrics,
}

impl SegmentResult {
    fn from_run(prices: &AlignedPrices, run: StrategyRun) -> Self {
        Self {
            start: prices.start(),
            end: prices.end(),
            len: prices.len(),
            returns: run.backtest.realized_returns().to_vec(),
            equity_curve: run.backtest.equity_curve,
            positions: run.backtest.positions,
            metrics: run.metrics,
        }
    }
}

/// In-sample and out-of-sample results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub config: WalkForwardConfig,
    /// Ratio applied to both segments.
    pub hedge_ratio: f64,
    pub in_sample: SegmentResult,
    pub out_of_sample: SegmentResult,
}

impl WalkForwardResult {
    /// Get a summary of the walk-forward validation.
    pub fn summary(&self) -> String {
        let fmt = |v: Option<f64>| v.map_or("n/a".to_string(), |v| format!("{:.2}", v));
        format!(
            "Walk-Forward Validation:\n\
             Hedge ratio: {:.4}\n\
             In-sample:  {} to {} ({} points), return {:.2}%, Sharpe {}\n\
             Out-of-sample: {} to {} ({} points), return {:.2}%, Sharpe {}",
            self.hedge_ratio,
            self.in_sample.start.format("%Y-%m-%d"),
            self.in_sample.end.format("%Y-%m-%d"),
            self.in_sample.len,
            self.in_sample.metrics.total_return * 100.0,
            fmt(self.in_sample.metrics.sharpe_ratio),
            self.out_of_sample.start.format("%Y-%m-%d"),
            self.out_of_sample.end.format("%Y-%m-%d"),
            self.out_of_sample.len,
            self.out_of_sample.metrics.total_return * 100.0,
            fmt(self.out_of_sample.metrics.sharpe_ratio),
        )
    }
}

/// Runs a strategy on a chronological train/test split.
pub struct WalkForwardValidator {
    config: WalkForwardConfig,
}

impl WalkForwardValidator {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self { config }
    }

    /// Split, fit the hedge ratio, and run both segments.
    ///
    /// Any failure, including the train-segment hedge fit, aborts the whole
    /// validation.
    pub fn run<S: Strategy + ?Sized>(
        &self,
        strategy: &S,
        prices: &AlignedPrices,
    ) -> Result<WalkForwardResult> {
        let (train, test) = walk_forward_split(prices, self.config.train_ratio)?;
        info!(
            "Walk-forward split: train {} points ({} to {}), test {} points ({} to {})",
            train.len(),
            train.start().format("%Y-%m-%d"),
            train.end().format("%Y-%m-%d"),
            test.len(),
            test.start().format("%Y-%m-%d"),
            test.end().format("%Y-%m-%d")
        );

        let beta = match self.config.hedge {
            HedgeSource::EstimateOnTrain => estimate_hedge_ratio(train.a(), train.b())?,
            HedgeSource::Fixed(beta) => beta,
        };
        if !beta.is_finite() {
            return Err(PairsError::InvalidInput(format!(
                "hedge ratio must be finite, got {}",
                beta
            )));
        }
        info!("Hedge ratio {:.4} applied to both segments", beta);
        let hedge = HedgeRatio::Static(beta);

        let in_sample = strategy.run_with_hedge(&train, &hedge)?;
        let out_of_sample = strategy.run_with_hedge(&test, &hedge)?;

        Ok(WalkForwardResult {
            config: self.config.clone(),
            hedge_ratio: beta,
            in_sample: SegmentResult::from_run(&train, in_sample),
            out_of_sample: SegmentResult::from_run(&test, out_of_sample),
        })
    }
}
