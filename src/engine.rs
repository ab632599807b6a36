//! Backtest execution engine.
//!
//! Turns a position series on the spread into period returns and an equity
//! curve. The position decided at the close of `t - 1` earns the spread
//! return over `(t - 1, t]`; every change in position pays a proportional
//! transaction cost.

use crate::analytics::equity_curve;
use crate::error::{PairsError, Result};
use crate::types::{AlignedPrices, HedgeRatio};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Frictions and annualization for a backtest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Cost per unit of position change, as a fraction of notional.
    #[serde(default)]
    pub transaction_cost: f64,
    /// Return observations per year (252 for daily bars).
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
}

fn default_periods_per_year() -> f64 {
    252.0
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            transaction_cost: 0.0,
            periods_per_year: default_periods_per_year(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.transaction_cost.is_finite() && self.transaction_cost >= 0.0) {
            return Err(PairsError::InvalidInput(format!(
                "transaction cost must be a non-negative number, got {}",
                self.transaction_cost
            )));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(PairsError::InvalidInput(format!(
                "periods per year must be positive, got {}",
                self.periods_per_year
            )));
        }
        Ok(())
    }
}

/// Results from a backtest run, aligned with the price index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub timestamps: Vec<DateTime<Utc>>,
    /// Net strategy return per period; the first is always zero.
    pub returns: Vec<f64>,
    /// Compounded value of one unit invested at the start.
    pub equity_curve: Vec<f64>,
    /// Position held at each close.
    pub positions: Vec<f64>,
}

impl BacktestResult {
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// All returns but the first, which has no prior close to measure from.
    pub fn realized_returns(&self) -> &[f64] {
        self.returns.get(1..).unwrap_or(&[])
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve.last().copied().unwrap_or(1.0)
    }

    pub fn total_return(&self) -> f64 {
        self.final_equity() - 1.0
    }

    /// Number of points at which the position changes, counting the first
    /// move away from zero.
    pub fn num_position_changes(&self) -> usize {
        let mut prev = 0.0;
        self.positions
            .iter()
            .filter(|p| {
                let changed = **p != prev;
                prev = **p;
                changed
            })
            .count()
    }
}

/// Simple returns of one leg; the first point has none.
fn simple_returns(prices: &[f64]) -> Vec<Option<f64>> {
    std::iter::once(None)
        .chain(prices.windows(2).map(|w| Some(w[1] / w[0] - 1.0)))
        .collect()
}

/// Run a position series against a price pair.
///
/// The spread return at `t` is `ret_a - beta * ret_b` with the hedge ratio in
/// force at `t - 1`. Holding a position into a period whose spread return is
/// undefined (no hedge ratio yet, or a zero price) is an error; a flat book
/// earns zero there.
pub fn backtest(
    prices: &AlignedPrices,
    positions: &[f64],
    hedge_ratio: &HedgeRatio,
    transaction_cost: f64,
) -> Result<BacktestResult> {
    let n = prices.len();
    if positions.len() != n {
        return Err(PairsError::InvalidInput(format!(
            "{} positions for {} prices",
            positions.len(),
            n
        )));
    }
    if let Some(i) = positions.iter().position(|p| !p.is_finite()) {
        return Err(PairsError::InvalidInput(format!(
            "non-finite position at index {}",
            i
        )));
    }
    if !(transaction_cost.is_finite() && transaction_cost >= 0.0) {
        return Err(PairsError::InvalidInput(format!(
            "transaction cost must be a non-negative number, got {}",
            transaction_cost
        )));
    }
    hedge_ratio.check_len(n)?;

    let ret_a = simple_returns(prices.a());
    let ret_b = simple_returns(prices.b());

    let mut returns = Vec::with_capacity(n);
    if n > 0 {
        returns.push(0.0);
    }
    for t in 1..n {
        let held = positions[t - 1];
        let gross = if held == 0.0 {
            0.0
        } else {
            let spread_return = match (ret_a[t], ret_b[t], hedge_ratio.at(t - 1)) {
                (Some(ra), Some(rb), Some(beta)) => Some(ra - beta * rb),
                _ => None,
            }
            .filter(|r| r.is_finite())
            .ok_or_else(|| {
                PairsError::InvalidInput(format!(
                    "position {} held into {} where the spread return is undefined",
                    held,
                    prices.timestamps()[t]
                ))
            })?;
            held * spread_return
        };
        let cost = transaction_cost * (positions[t] - held).abs();
        returns.push(gross - cost);
    }

    let equity_curve = equity_curve(&returns);
    let result = BacktestResult {
        timestamps: prices.timestamps().to_vec(),
        returns,
        equity_curve,
        positions: positions.to_vec(),
    };
    debug!(
        "Backtest over {} periods: {} position changes, total return {:.4}",
        n,
        result.num_position_changes(),
        result.total_return()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> AlignedPrices {
        AlignedPrices::from_values(
            vec![100.0, 110.0, 99.0, 99.0, 108.9],
            vec![50.0, 50.0, 55.0, 55.0, 55.0],
        )
        .unwrap()
    }

    #[test]
    fn test_first_return_is_zero() {
        let result = backtest(&prices(), &[1.0; 5], &HedgeRatio::Static(1.0), 0.01).unwrap();
        assert_eq!(result.returns[0], 0.0);
        assert_eq!(result.equity_curve[0], 1.0);
        assert_eq!(result.realized_returns().len(), 4);
    }

    #[test]
    fn test_position_is_lagged() {
        // Long from t = 1: the +10% move into t = 1 is not captured.
        let positions = [0.0, 1.0, 1.0, 1.0, 1.0];
        let result = backtest(&prices(), &positions, &HedgeRatio::Static(0.0), 0.0).unwrap();
        assert_eq!(result.returns[1], 0.0);
        assert!((result.returns[2] - (-0.1)).abs() < 1e-12);
        assert!((result.returns[4] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_spread_return_uses_hedge() {
        // ret_a = -10%, ret_b = +10% at t = 2; short spread with beta 2.
        let positions = [-1.0; 5];
        let result = backtest(&prices(), &positions, &HedgeRatio::Static(2.0), 0.0).unwrap();
        assert!((result.returns[2] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_transaction_costs() {
        let positions = [0.0, 1.0, -1.0, -1.0, 0.0];
        let result = backtest(&prices(), &positions, &HedgeRatio::Static(0.0), 0.001).unwrap();
        assert!((result.returns[1] - (-0.001)).abs() < 1e-15);
        // Flip pays twice, on top of the long leg's -10%.
        assert!((result.returns[2] - (-0.1 - 0.002)).abs() < 1e-12);
        assert_eq!(result.num_position_changes(), 3);
    }

    #[test]
    fn test_equity_compounds() {
        let positions = [1.0; 5];
        let result = backtest(&prices(), &positions, &HedgeRatio::Static(0.0), 0.0).unwrap();
        let product: f64 = result.returns.iter().map(|r| 1.0 + r).product();
        assert!((result.final_equity() - product).abs() < 1e-12);
        assert!((result.total_return() - (108.9 / 100.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_hedge_warmup() {
        let rolling = HedgeRatio::Rolling(vec![None, None, Some(1.0), Some(1.0), Some(1.0)]);
        let flat_then_long = [0.0, 0.0, 1.0, 1.0, 1.0];
        assert!(backtest(&prices(), &flat_then_long, &rolling, 0.0).is_ok());

        let early = [1.0; 5];
        assert!(matches!(
            backtest(&prices(), &early, &rolling, 0.0),
            Err(PairsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_input_validation() {
        let p = prices();
        assert!(backtest(&p, &[0.0; 4], &HedgeRatio::Static(1.0), 0.0).is_err());
        assert!(backtest(&p, &[0.0; 5], &HedgeRatio::Static(1.0), -0.1).is_err());
        assert!(backtest(&p, &[f64::NAN; 5], &HedgeRatio::Static(1.0), 0.0).is_err());
        assert!(BacktestConfig::default().validate().is_ok());
    }
}
