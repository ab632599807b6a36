//! Augmented Dickey-Fuller unit-root test.
//!
//! The regression is
//!
//! ```text
//! dy_t = [trend terms] + g * y_{t-1} + sum_{i=1..p} d_i * dy_{t-i} + e_t
//! ```
//!
//! and the statistic is the t-value of `g`. The lag order `p` is chosen by an
//! information criterion over `0..=max_lag`, every candidate fitted on the same
//! trailing sample so the criteria are comparable; the winning order is then
//! refitted on the longest sample it allows.
//!
//! p-values use MacKinnon's (1994) response-surface approximation and critical
//! values his (2010) finite-sample tables, for one series (the plain ADF test)
//! or two (residuals of an Engle-Granger cointegrating regression).

use crate::error::{PairsError, Result};
use crate::regression::{ols, OlsFit};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

/// Minimum observations for any of the tests in this crate.
pub const MIN_TEST_OBSERVATIONS: usize = 20;

/// Deterministic terms included in the test regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdfRegression {
    /// No constant, no trend.
    NoConstant,
    /// Constant only.
    #[default]
    Constant,
    /// Constant and linear trend.
    ConstantTrend,
}

impl AdfRegression {
    fn trend_terms(self) -> usize {
        match self {
            AdfRegression::NoConstant => 0,
            AdfRegression::Constant => 1,
            AdfRegression::ConstantTrend => 2,
        }
    }
}

/// How the number of lagged differences is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LagSelection {
    /// Minimise Akaike's criterion.
    #[default]
    Aic,
    /// Minimise Schwarz's criterion.
    Bic,
    /// Drop lags from the top until the last one is significant at 5%.
    TStat,
    /// Use exactly this many lags.
    Fixed(usize),
}

/// ADF test settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdfConfig {
    pub regression: AdfRegression,
    pub lag_selection: LagSelection,
    /// Upper bound for the search; defaults to `ceil(12 * (n/100)^(1/4))`.
    pub max_lag: Option<usize>,
}

impl Default for AdfConfig {
    fn default() -> Self {
        Self {
            regression: AdfRegression::Constant,
            lag_selection: LagSelection::Aic,
            max_lag: None,
        }
    }
}

/// 1%, 5% and 10% critical values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

/// Outcome of a Dickey-Fuller style test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    /// Lagged differences in the final regression.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
    pub critical_values: CriticalValues,
}

impl AdfResult {
    /// Whether the unit-root null is rejected at `alpha`.
    pub fn is_stationary(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Reject short or non-finite samples.
pub(crate) fn check_sample(series: &[f64], label: &str) -> Result<()> {
    if series.len() < MIN_TEST_OBSERVATIONS {
        return Err(PairsError::Statistical(format!(
            "{} has {} observations, at least {} required",
            label,
            series.len(),
            MIN_TEST_OBSERVATIONS
        )));
    }
    if series.iter().any(|v| !v.is_finite()) {
        return Err(PairsError::Statistical(format!(
            "{} contains non-finite values",
            label
        )));
    }
    Ok(())
}

/// ADF test with a constant and AIC lag selection.
pub fn stationarity_test(series: &[f64]) -> Result<AdfResult> {
    adf_test(series, &AdfConfig::default())
}

/// ADF test with explicit settings.
pub fn adf_test(series: &[f64], config: &AdfConfig) -> Result<AdfResult> {
    check_sample(series, "series")?;
    adf_core(series, config, config.regression, 1)
}

/// Shared body of the ADF and Engle-Granger tests.
///
/// `table` and `n_vars` select the MacKinnon surface used for the p-value and
/// critical values; they differ from `config.regression` for cointegration
/// residuals, which are tested without a constant but carry the constant of
/// the cointegrating regression.
pub(crate) fn adf_core(
    series: &[f64],
    config: &AdfConfig,
    table: AdfRegression,
    n_vars: usize,
) -> Result<AdfResult> {
    let n = series.len();
    let ntrend = config.regression.trend_terms();

    let max_feasible = (n / 2).checked_sub(ntrend + 1).ok_or_else(|| {
        PairsError::Statistical(format!(
            "{} observations too few for the selected regression",
            n
        ))
    })?;

    let max_lag = match (config.lag_selection, config.max_lag) {
        (LagSelection::Fixed(p), _) => p,
        (_, Some(p)) => p,
        (_, None) => {
            let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
            schwert.min(max_feasible)
        }
    };
    if max_lag > max_feasible {
        return Err(PairsError::Statistical(format!(
            "max lag {} exceeds {} allowed for {} observations",
            max_lag, max_feasible, n
        )));
    }

    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let used_lag = match config.lag_selection {
        LagSelection::Fixed(p) => p,
        selection => select_lag(series, &diffs, config.regression, max_lag, selection)?,
    };
    debug!("ADF lag order {} (max {})", used_lag, max_lag);

    let fit = fit_adf(series, &diffs, config.regression, used_lag, used_lag)?;
    let statistic = fit.t_value(ntrend);
    if !statistic.is_finite() {
        return Err(PairsError::Statistical(
            "test regression has a perfect fit".to_string(),
        ));
    }

    let nobs = fit.nobs;
    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p_value(statistic, table, n_vars)?,
        used_lag,
        nobs,
        critical_values: mackinnon_critical_values(table, n_vars, nobs)?,
    })
}

/// Pick the lag order; every candidate uses the sample that starts at `max_lag`.
fn select_lag(
    series: &[f64],
    diffs: &[f64],
    regression: AdfRegression,
    max_lag: usize,
    selection: LagSelection,
) -> Result<usize> {
    let fits = (0..=max_lag)
        .map(|lag| fit_adf(series, diffs, regression, lag, max_lag).map(|f| (lag, f)))
        .collect::<Result<Vec<(usize, OlsFit)>>>()?;

    let by_criterion = |ic: fn(&OlsFit) -> f64| {
        fits.iter()
            .map(|(lag, fit)| (ic(fit), *lag))
            .fold((f64::INFINITY, 0), |best, cur| if cur.0 < best.0 { cur } else { best })
            .1
    };

    Ok(match selection {
        LagSelection::Aic => by_criterion(OlsFit::aic),
        LagSelection::Bic => by_criterion(OlsFit::bic),
        LagSelection::TStat => {
            // 95% one-sided normal quantile.
            const STOP: f64 = 1.644_853_626_951_472_2;
            fits.iter()
                .rev()
                .find(|(lag, fit)| *lag == 0 || fit.t_value(fit.params.len() - 1).abs() >= STOP)
                .map(|(lag, _)| *lag)
                .unwrap_or(0)
        }
        LagSelection::Fixed(p) => p,
    })
}

/// Fit the ADF regression with `lag` lagged differences on rows starting at
/// `start` (an index into `diffs`, at least `lag`).
///
/// Columns: trend terms, the lagged level, then the lagged differences.
fn fit_adf(
    series: &[f64],
    diffs: &[f64],
    regression: AdfRegression,
    lag: usize,
    start: usize,
) -> Result<OlsFit> {
    let rows = diffs.len() - start;
    let ntrend = regression.trend_terms();
    let cols = ntrend + 1 + lag;

    let design = DMatrix::from_fn(rows, cols, |r, c| {
        let t = start + r;
        match c {
            0 if ntrend > 0 => 1.0,
            1 if ntrend > 1 => (r + 1) as f64,
            c if c == ntrend => series[t],
            c => diffs[t - (c - ntrend)],
        }
    });

    ols(&diffs[start..], &design)
}

// MacKinnon (1994) p-value surfaces, rows for one and two series.
const TAU_MAX_NC: [f64; 2] = [1.51, 0.86];
const TAU_MIN_NC: [f64; 2] = [-19.04, -19.62];
const TAU_STAR_NC: [f64; 2] = [-1.04, -1.53];
const TAU_NC_SMALLP: [[f64; 3]; 2] = [[0.6344, 1.2378, 0.032496], [1.9129, 1.3857, 0.035322]];
const TAU_NC_LARGEP: [[f64; 4]; 2] = [
    [0.4797, 0.93557, -0.06999, 0.033066],
    [1.5578, 0.8558, -0.2083, -0.033549],
];

const TAU_MAX_C: [f64; 2] = [2.74, 0.92];
const TAU_MIN_C: [f64; 2] = [-18.83, -18.86];
const TAU_STAR_C: [f64; 2] = [-1.61, -2.62];
const TAU_C_SMALLP: [[f64; 3]; 2] = [[2.1659, 1.4412, 0.038269], [2.92, 1.5012, 0.039796]];
const TAU_C_LARGEP: [[f64; 4]; 2] = [
    [1.7339, 0.93202, -0.12745, -0.010368],
    [2.1945, 0.64695, -0.29198, -0.042377],
];

const TAU_MAX_CT: [f64; 2] = [0.7, 0.63];
const TAU_MIN_CT: [f64; 2] = [-16.18, -21.15];
const TAU_STAR_CT: [f64; 2] = [-2.89, -3.19];
const TAU_CT_SMALLP: [[f64; 3]; 2] = [[3.2512, 1.6047, 0.049588], [3.6646, 1.5419, 0.036448]];
const TAU_CT_LARGEP: [[f64; 4]; 2] = [
    [2.5261, 0.61654, -0.37956, -0.060285],
    [3.0778, 0.49529, -0.41477, -0.059359],
];

fn polyval(coefs: &[f64], x: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn table_row(n_vars: usize) -> Result<usize> {
    match n_vars {
        1 | 2 => Ok(n_vars - 1),
        _ => Err(PairsError::Statistical(format!(
            "no MacKinnon table for {} series",
            n_vars
        ))),
    }
}

/// Approximate p-value of a Dickey-Fuller statistic.
pub fn mackinnon_p_value(stat: f64, regression: AdfRegression, n_vars: usize) -> Result<f64> {
    let row = table_row(n_vars)?;
    let (max, min, star, small, large) = match regression {
        AdfRegression::NoConstant => (
            TAU_MAX_NC[row],
            TAU_MIN_NC[row],
            TAU_STAR_NC[row],
            TAU_NC_SMALLP[row],
            TAU_NC_LARGEP[row],
        ),
        AdfRegression::Constant => (
            TAU_MAX_C[row],
            TAU_MIN_C[row],
            TAU_STAR_C[row],
            TAU_C_SMALLP[row],
            TAU_C_LARGEP[row],
        ),
        AdfRegression::ConstantTrend => (
            TAU_MAX_CT[row],
            TAU_MIN_CT[row],
            TAU_STAR_CT[row],
            TAU_CT_SMALLP[row],
            TAU_CT_LARGEP[row],
        ),
    };

    if stat > max {
        return Ok(1.0);
    }
    if stat < min {
        return Ok(0.0);
    }

    let z = if stat <= star {
        polyval(&small, stat)
    } else {
        polyval(&large, stat)
    };
    let normal = Normal::new(0.0, 1.0).map_err(|e| PairsError::Statistical(e.to_string()))?;
    Ok(normal.cdf(z))
}

// MacKinnon (2010) critical value surfaces: b0 + b1/T + b2/T^2 + b3/T^3.
const CRIT_NC: [[[f64; 4]; 3]; 1] = [[
    [-2.56574, -2.2358, -3.627, 0.0],
    [-1.94100, -0.2686, -3.365, 31.223],
    [-1.61682, 0.2656, -2.714, 25.364],
]];
const CRIT_C: [[[f64; 4]; 3]; 2] = [
    [
        [-3.43035, -6.5393, -16.786, -79.433],
        [-2.86154, -2.8903, -4.234, -40.040],
        [-2.56677, -1.5384, -2.809, 0.0],
    ],
    [
        [-3.89644, -10.9519, -33.527, 0.0],
        [-3.33613, -6.1101, -6.823, 0.0],
        [-3.04445, -4.2412, -2.720, 0.0],
    ],
];
const CRIT_CT: [[[f64; 4]; 3]; 2] = [
    [
        [-3.95877, -9.0531, -28.428, -134.155],
        [-3.41049, -4.3904, -9.036, -45.374],
        [-3.12705, -2.5856, -3.925, -22.380],
    ],
    [
        [-4.32762, -15.4387, -35.679, 0.0],
        [-3.78057, -9.5106, -12.074, 0.0],
        [-3.49631, -7.0815, -7.538, 21.892],
    ],
];

/// Finite-sample critical values for `nobs` observations.
///
/// The no-constant surface exists for a single series only.
pub fn mackinnon_critical_values(
    regression: AdfRegression,
    n_vars: usize,
    nobs: usize,
) -> Result<CriticalValues> {
    let row = table_row(n_vars)?;
    let table = match regression {
        AdfRegression::NoConstant => CRIT_NC.get(row),
        AdfRegression::Constant => CRIT_C.get(row),
        AdfRegression::ConstantTrend => CRIT_CT.get(row),
    }
    .ok_or_else(|| {
        PairsError::Statistical(format!(
            "no critical values for {:?} with {} series",
            regression, n_vars
        ))
    })?;
    let inv = 1.0 / nobs as f64;
    Ok(CriticalValues {
        one_pct: polyval(&table[0], inv),
        five_pct: polyval(&table[1], inv),
        ten_pct: polyval(&table[2], inv),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// AR(1) with coefficient `phi`, driven by a deterministic pseudo-noise.
    fn ar1(n: usize, phi: f64) -> Vec<f64> {
        let mut y = Vec::with_capacity(n);
        let mut prev = 0.0;
        for i in 0..n {
            let noise = ((i as f64 * 12.9898).sin() * 43758.5453).fract().abs() - 0.5;
            prev = phi * prev + noise;
            y.push(prev);
        }
        y
    }

    #[test]
    fn test_stationary_series_rejects_unit_root() {
        let series = ar1(300, 0.2);
        let result = stationarity_test(&series).unwrap();
        assert!(result.statistic < result.critical_values.one_pct);
        assert!(result.p_value < 0.01);
        assert!(result.is_stationary(0.05));
    }

    #[test]
    fn test_explosive_series_keeps_unit_root() {
        let noise = ar1(300, 0.0);
        let series: Vec<f64> = noise
            .iter()
            .enumerate()
            .map(|(i, e)| 10.0 * 1.01_f64.powi(i as i32) + e)
            .collect();
        let result = stationarity_test(&series).unwrap();
        assert!(result.p_value > 0.5, "p = {}", result.p_value);
        assert!(!result.is_stationary(0.05));
    }

    #[test]
    fn test_short_series_is_statistical_error() {
        let series = ar1(10, 0.5);
        assert!(matches!(
            stationarity_test(&series),
            Err(PairsError::Statistical(_))
        ));
    }

    #[test]
    fn test_non_finite_is_statistical_error() {
        let mut series = ar1(50, 0.5);
        series[10] = f64::NAN;
        assert!(matches!(
            stationarity_test(&series),
            Err(PairsError::Statistical(_))
        ));
    }

    #[test]
    fn test_lag_selection_bounds() {
        let series = ar1(100, 0.5);
        let result = stationarity_test(&series).unwrap();
        // ceil(12 * 1^(1/4)) = 12
        assert!(result.used_lag <= 12);
        assert_eq!(result.nobs, 99 - result.used_lag);

        let fixed = adf_test(
            &series,
            &AdfConfig {
                lag_selection: LagSelection::Fixed(3),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(fixed.used_lag, 3);
        assert_eq!(fixed.nobs, 96);

        let too_many = adf_test(
            &series,
            &AdfConfig {
                lag_selection: LagSelection::Fixed(60),
                ..Default::default()
            },
        );
        assert!(too_many.is_err());
    }

    #[test]
    fn test_other_selections_run() {
        let series = ar1(200, 0.6);
        for selection in [LagSelection::Bic, LagSelection::TStat] {
            for regression in [
                AdfRegression::NoConstant,
                AdfRegression::Constant,
                AdfRegression::ConstantTrend,
            ] {
                let config = AdfConfig {
                    regression,
                    lag_selection: selection,
                    max_lag: Some(6),
                };
                let result = adf_test(&series, &config).unwrap();
                assert!(result.used_lag <= 6);
                assert!((0.0..=1.0).contains(&result.p_value));
            }
        }
    }

    #[test]
    fn test_mackinnon_p_value_shape() {
        let p_far = mackinnon_p_value(-6.0, AdfRegression::Constant, 1).unwrap();
        let p_mid = mackinnon_p_value(-2.86, AdfRegression::Constant, 1).unwrap();
        let p_near = mackinnon_p_value(-0.5, AdfRegression::Constant, 1).unwrap();
        assert!(p_far < p_mid && p_mid < p_near);
        // The 5% asymptotic critical value should map to roughly 5%.
        assert!((p_mid - 0.05).abs() < 0.01, "p = {}", p_mid);

        assert_eq!(mackinnon_p_value(5.0, AdfRegression::Constant, 1).unwrap(), 1.0);
        assert_eq!(mackinnon_p_value(-30.0, AdfRegression::Constant, 2).unwrap(), 0.0);
        assert!(mackinnon_p_value(-3.0, AdfRegression::Constant, 3).is_err());
    }

    #[test]
    fn test_critical_values_ordering() {
        let cv = mackinnon_critical_values(AdfRegression::Constant, 1, 250).unwrap();
        assert!(cv.one_pct < cv.five_pct && cv.five_pct < cv.ten_pct);
        assert!((cv.five_pct - (-2.873)).abs() < 0.01);

        let coint = mackinnon_critical_values(AdfRegression::Constant, 2, 250).unwrap();
        assert!(coint.five_pct < cv.five_pct);
        assert!(mackinnon_critical_values(AdfRegression::NoConstant, 2, 250).is_err());
    }
}
