//! Cointegration analysis of a price pair.
//!
//! Hedge-ratio estimation (static and rolling), spread construction, the
//! Engle-Granger cointegration test and the half-life of mean reversion.

use crate::error::{PairsError, Result};
use crate::regression::ols_with_intercept;
use crate::stationarity::{
    adf_core, check_sample, mackinnon_critical_values, stationarity_test, AdfConfig,
    AdfRegression, AdfResult, CriticalValues, LagSelection,
};
use crate::types::{AlignedPrices, HedgeRatio};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Engle-Granger test outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CointegrationResult {
    pub test_statistic: f64,
    pub p_value: f64,
    pub critical_values: CriticalValues,
    /// Lag order of the residual ADF regression; `None` when the legs are
    /// collinear and no regression was run.
    pub used_lag: Option<usize>,
}

impl CointegrationResult {
    /// Whether the no-cointegration null is rejected at `alpha`.
    pub fn is_cointegrated(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

fn check_pair(a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        return Err(PairsError::InvalidInput(format!(
            "series differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(PairsError::DataAlignment(
            "price series contain non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Engle-Granger two-step test: regress `a` on `b` with an intercept, then run
/// an ADF test (no constant, AIC lag order) on the residuals and score it
/// against the two-variable MacKinnon surface.
///
/// Legs that are collinear to within rounding get a statistic of negative
/// infinity and a p-value of zero.
pub fn cointegration_test(a: &[f64], b: &[f64]) -> Result<CointegrationResult> {
    if a.len() != b.len() {
        return Err(PairsError::InvalidInput(format!(
            "series differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    check_sample(a, "asset A")?;
    check_sample(b, "asset B")?;

    let n = a.len();
    let fit = ols_with_intercept(a, b)?;
    let residuals = fit.residuals(a, b);
    let critical_values = mackinnon_critical_values(AdfRegression::Constant, 2, n - 1)?;

    let mean_a = a.iter().sum::<f64>() / n as f64;
    let sst: f64 = a.iter().map(|v| (v - mean_a).powi(2)).sum();
    let ssr: f64 = residuals.iter().map(|r| r * r).sum();
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { 0.0 };

    if r_squared >= 1.0 - 100.0 * f64::EPSILON.sqrt() {
        warn!(
            "Legs are (almost) perfectly collinear (R^2 = {:.10}); cointegration is trivial",
            r_squared
        );
        return Ok(CointegrationResult {
            test_statistic: f64::NEG_INFINITY,
            p_value: 0.0,
            critical_values,
            used_lag: None,
        });
    }

    let config = AdfConfig {
        regression: AdfRegression::NoConstant,
        lag_selection: LagSelection::Aic,
        max_lag: None,
    };
    let adf = adf_core(&residuals, &config, AdfRegression::Constant, 2)?;
    debug!(
        "Engle-Granger: stat {:.4}, p {:.4}, lag {}",
        adf.statistic, adf.p_value, adf.used_lag
    );

    Ok(CointegrationResult {
        test_statistic: adf.statistic,
        p_value: adf.p_value,
        critical_values,
        used_lag: Some(adf.used_lag),
    })
}

/// OLS slope of `a` on `b` (with intercept).
pub fn estimate_hedge_ratio(a: &[f64], b: &[f64]) -> Result<f64> {
    check_pair(a, b)?;
    Ok(ols_with_intercept(a, b)?.slope)
}

/// Hedge ratio refitted at every index `i >= window` on the points
/// `[i - window, i)`. Earlier points have no estimate.
///
/// A window over which `b` is flat fails the whole estimate.
pub fn estimate_rolling_hedge_ratio(a: &[f64], b: &[f64], window: usize) -> Result<Vec<Option<f64>>> {
    check_pair(a, b)?;
    if window < 2 {
        return Err(PairsError::InvalidInput(format!(
            "rolling hedge window must be at least 2, got {}",
            window
        )));
    }

    (0..a.len())
        .map(|i| {
            if i < window {
                return Ok(None);
            }
            let range = i - window..i;
            ols_with_intercept(&a[range.clone()], &b[range])
                .map(|fit| Some(fit.slope))
                .map_err(|e| match e {
                    PairsError::SingularRegression(msg) => PairsError::SingularRegression(
                        format!("rolling window ending at {}: {}", i, msg),
                    ),
                    other => other,
                })
        })
        .collect()
}

/// `a - beta * b` at every point; undefined where a rolling ratio is.
pub fn compute_spread(a: &[f64], b: &[f64], hedge_ratio: &HedgeRatio) -> Result<Vec<Option<f64>>> {
    if a.len() != b.len() {
        return Err(PairsError::InvalidInput(format!(
            "series differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    hedge_ratio.check_len(a.len())?;

    Ok(a
        .iter()
        .zip(b.iter())
        .enumerate()
        .map(|(i, (pa, pb))| hedge_ratio.at(i).map(|beta| pa - beta * pb))
        .collect())
}

/// Periods for a deviation of the spread to decay halfway, from the AR(1)
/// regression `ds_t = c + beta * s_{t-1}`.
///
/// A negative or infinite value means the spread is not mean-reverting over
/// the sample; it is returned as-is with a warning.
pub fn half_life(spread: &[f64]) -> Result<f64> {
    if spread.len() < 3 {
        return Err(PairsError::SingularRegression(format!(
            "half-life needs at least 3 points, got {}",
            spread.len()
        )));
    }
    if spread.iter().any(|v| !v.is_finite()) {
        return Err(PairsError::InvalidInput(
            "spread contains non-finite values".to_string(),
        ));
    }

    let lagged = &spread[..spread.len() - 1];
    let delta: Vec<f64> = spread.windows(2).map(|w| w[1] - w[0]).collect();
    let beta = ols_with_intercept(&delta, lagged)?.slope;
    if beta == 0.0 {
        return Err(PairsError::SingularRegression(
            "lagged-level coefficient is zero".to_string(),
        ));
    }

    let hl = -std::f64::consts::LN_2 / beta;
    if !hl.is_finite() || hl < 0.0 {
        warn!("Spread is not mean-reverting: half-life {:.4} (beta {:.6})", hl, beta);
    }
    Ok(hl)
}

/// Everything the pair analysis reports in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CointegrationReport {
    pub asset_a: String,
    pub asset_b: String,
    pub observations: usize,
    pub hedge_ratio: f64,
    pub intercept: f64,
    pub cointegration: CointegrationResult,
    /// ADF test on `a - hedge_ratio * b`.
    pub spread_stationarity: AdfResult,
    pub half_life: f64,
}

/// Static hedge ratio, Engle-Granger test, spread ADF and half-life for a pair.
pub fn analyze_pair(prices: &AlignedPrices) -> Result<CointegrationReport> {
    let (a, b) = (prices.a(), prices.b());
    let fit = ols_with_intercept(a, b)?;
    info!(
        "Hedge ratio {}/{}: {:.4} (intercept {:.4})",
        prices.asset_a(),
        prices.asset_b(),
        fit.slope,
        fit.intercept
    );

    let cointegration = cointegration_test(a, b)?;
    let spread: Vec<f64> = compute_spread(a, b, &HedgeRatio::Static(fit.slope))?
        .into_iter()
        .flatten()
        .collect();
    let spread_stationarity = stationarity_test(&spread)?;
    if !spread_stationarity.is_stationary(0.05) {
        warn!(
            "Spread ADF p-value {:.4} is above 0.05",
            spread_stationarity.p_value
        );
    }
    let half_life = half_life(&spread)?;

    Ok(CointegrationReport {
        asset_a: prices.asset_a().to_string(),
        asset_b: prices.asset_b().to_string(),
        observations: prices.len(),
        hedge_ratio: fit.slope,
        intercept: fit.intercept,
        cointegration,
        spread_stationarity,
        half_life,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_walk(rng: &mut StdRng, n: usize, start: f64) -> Vec<f64> {
        let mut level = start;
        (0..n)
            .map(|_| {
                level += rng.gen_range(-1.0..1.0);
                level
            })
            .collect()
    }

    fn ar1(rng: &mut StdRng, n: usize, phi: f64, scale: f64) -> Vec<f64> {
        let mut prev = 0.0;
        (0..n)
            .map(|_| {
                prev = phi * prev + rng.gen_range(-scale..scale);
                prev
            })
            .collect()
    }

    fn cointegrated_pair(n: usize) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(7);
        let b = random_walk(&mut rng, n, 100.0);
        let noise = ar1(&mut rng, n, 0.3, 0.5);
        let a = b.iter().zip(noise.iter()).map(|(pb, e)| 2.0 * pb + e).collect();
        (a, b)
    }

    #[test]
    fn test_cointegrated_pair_detected() {
        let (a, b) = cointegrated_pair(250);
        let result = cointegration_test(&a, &b).unwrap();
        assert!(result.test_statistic < result.critical_values.one_pct);
        assert!(result.is_cointegrated(0.01), "p = {}", result.p_value);
        assert!(result.used_lag.is_some());
    }

    #[test]
    fn test_collinear_pair_is_trivially_cointegrated() {
        let b: Vec<f64> = (0..50).map(|i| 10.0 + (i as f64 * 0.4).sin()).collect();
        let a: Vec<f64> = b.iter().map(|v| 1.0 + 2.0 * v).collect();
        let result = cointegration_test(&a, &b).unwrap();
        assert_eq!(result.test_statistic, f64::NEG_INFINITY);
        assert_eq!(result.p_value, 0.0);
        assert_eq!(result.used_lag, None);
    }

    #[test]
    fn test_cointegration_rejects_short_and_non_finite() {
        let short = vec![1.0; 10];
        assert!(matches!(
            cointegration_test(&short, &short),
            Err(PairsError::Statistical(_))
        ));

        let (mut a, b) = cointegrated_pair(50);
        a[5] = f64::INFINITY;
        assert!(matches!(
            cointegration_test(&a, &b),
            Err(PairsError::Statistical(_))
        ));
    }

    #[test]
    fn test_hedge_ratio_recovers_beta() {
        let b: Vec<f64> = (0..100).map(|i| 50.0 + i as f64 * 0.5).collect();
        let a: Vec<f64> = b.iter().map(|v| 1.7 * v).collect();
        let beta = estimate_hedge_ratio(&a, &b).unwrap();
        assert!((beta - 1.7).abs() < 1e-10);
    }

    #[test]
    fn test_hedge_ratio_constant_leg() {
        let a: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let b = vec![25.0; 30];
        assert!(matches!(
            estimate_hedge_ratio(&a, &b),
            Err(PairsError::SingularRegression(_))
        ));
    }

    #[test]
    fn test_rolling_hedge_ratio_warmup_and_values() {
        let (a, b) = cointegrated_pair(120);
        let rolling = estimate_rolling_hedge_ratio(&a, &b, 30).unwrap();
        assert_eq!(rolling.len(), 120);
        assert!(rolling[..30].iter().all(|v| v.is_none()));
        assert!(rolling[30..].iter().all(|v| v.is_some()));

        let expected = estimate_hedge_ratio(&a[10..40], &b[10..40]).unwrap();
        assert_eq!(rolling[40], Some(expected));
    }

    #[test]
    fn test_rolling_hedge_ratio_has_no_lookahead() {
        let (a, b) = cointegrated_pair(80);
        let before = estimate_rolling_hedge_ratio(&a, &b, 20).unwrap();

        let mut shocked = a.clone();
        shocked[50] += 100.0;
        let after = estimate_rolling_hedge_ratio(&shocked, &b, 20).unwrap();

        assert_eq!(before[..=50], after[..=50]);
        assert_ne!(before[51], after[51]);
    }

    #[test]
    fn test_rolling_hedge_ratio_bad_window() {
        let (a, b) = cointegrated_pair(40);
        assert!(estimate_rolling_hedge_ratio(&a, &b, 1).is_err());
        let long = estimate_rolling_hedge_ratio(&a, &b, 100).unwrap();
        assert!(long.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_compute_spread() {
        let a = vec![10.0, 12.0, 14.0];
        let b = vec![4.0, 5.0, 6.0];

        let fixed = compute_spread(&a, &b, &HedgeRatio::Static(2.0)).unwrap();
        assert_eq!(fixed, vec![Some(2.0), Some(2.0), Some(2.0)]);

        let rolling = HedgeRatio::Rolling(vec![None, Some(2.0), Some(1.0)]);
        let spread = compute_spread(&a, &b, &rolling).unwrap();
        assert_eq!(spread, vec![None, Some(2.0), Some(8.0)]);

        let short = HedgeRatio::Rolling(vec![None]);
        assert!(compute_spread(&a, &b, &short).is_err());
    }

    #[test]
    fn test_half_life_of_mean_reverting_spread() {
        let mut rng = StdRng::seed_from_u64(11);
        let spread = ar1(&mut rng, 500, 0.5, 1.0);
        let hl = half_life(&spread).unwrap();
        // Exact value for phi = 0.5 is ln2 / 0.5 ~= 1.39.
        assert!(hl > 0.5 && hl < 5.0, "half-life {}", hl);
    }

    #[test]
    fn test_half_life_surfaces_divergence() {
        let spread: Vec<f64> = (0..40).map(|i| 1.05_f64.powi(i)).collect();
        let hl = half_life(&spread).unwrap();
        assert!(hl < 0.0);
    }

    #[test]
    fn test_half_life_errors() {
        assert!(matches!(
            half_life(&[1.0, 2.0]),
            Err(PairsError::SingularRegression(_))
        ));
        assert!(matches!(
            half_life(&[3.0; 10]),
            Err(PairsError::SingularRegression(_))
        ));
    }

    #[test]
    fn test_analyze_pair() {
        let (a, b) = cointegrated_pair(200);
        let prices = AlignedPrices::from_values(a, b).unwrap();
        let report = analyze_pair(&prices).unwrap();
        assert!((report.hedge_ratio - 2.0).abs() < 0.05);
        assert!(report.cointegration.is_cointegrated(0.05));
        assert!(report.spread_stationarity.is_stationary(0.05));
        assert!(report.half_life > 0.0 && report.half_life < 10.0);
        assert_eq!(report.observations, 200);
    }
}
