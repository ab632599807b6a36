//! Ordinary least squares.
//!
//! Two entry points: [`ols_with_intercept`] for the single-regressor fits used
//! by hedge-ratio and half-life estimation, and [`ols`] for the multi-column
//! fits behind the Dickey-Fuller regressions.

use crate::error::{PairsError, Result};
use nalgebra::{DMatrix, DVector};

/// Result of `y = intercept + slope * x + e`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleOls {
    pub intercept: f64,
    pub slope: f64,
    /// Number of observations used.
    pub nobs: usize,
}

impl SimpleOls {
    /// Residuals `y - (intercept + slope * x)`.
    pub fn residuals(&self, y: &[f64], x: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(x.iter())
            .map(|(yi, xi)| yi - self.intercept - self.slope * xi)
            .collect()
    }
}

/// Fit `y` on `x` with an intercept.
///
/// Fails with `SingularRegression` on fewer than two points or when `x` has
/// no variance over the sample.
pub fn ols_with_intercept(y: &[f64], x: &[f64]) -> Result<SimpleOls> {
    if y.len() != x.len() {
        return Err(PairsError::InvalidInput(format!(
            "regression inputs differ in length: {} vs {}",
            y.len(),
            x.len()
        )));
    }
    let n = x.len();
    if n < 2 {
        return Err(PairsError::SingularRegression(format!(
            "need at least 2 observations, got {}",
            n
        )));
    }

    let n_f = n as f64;
    let mean_x = x.iter().sum::<f64>() / n_f;
    let mean_y = y.iter().sum::<f64>() / n_f;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut sum_sq_x = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        sxx += dx * dx;
        sxy += dx * (yi - mean_y);
        sum_sq_x += xi * xi;
    }

    // Relative test: a constant regressor leaves only rounding noise in sxx.
    if sxx <= f64::EPSILON * sum_sq_x || sxx == 0.0 {
        return Err(PairsError::SingularRegression(
            "regressor has zero variance".to_string(),
        ));
    }

    let slope = sxy / sxx;
    Ok(SimpleOls {
        intercept: mean_y - slope * mean_x,
        slope,
        nobs: n,
    })
}

/// Result of a multiple regression `y = X b + e`.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub params: Vec<f64>,
    pub std_errors: Vec<f64>,
    /// Sum of squared residuals.
    pub ssr: f64,
    pub nobs: usize,
}

impl OlsFit {
    /// t-statistic of coefficient `i`.
    pub fn t_value(&self, i: usize) -> f64 {
        self.params[i] / self.std_errors[i]
    }

    /// Gaussian log-likelihood at the fitted parameters.
    pub fn log_likelihood(&self) -> f64 {
        let n = self.nobs as f64;
        -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0)
    }

    /// Akaike information criterion.
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * self.params.len() as f64
    }

    /// Bayesian information criterion.
    pub fn bic(&self) -> f64 {
        -2.0 * self.log_likelihood() + (self.nobs as f64).ln() * self.params.len() as f64
    }
}

/// Fit `y` on the columns of `x` (no implicit intercept).
pub fn ols(y: &[f64], x: &DMatrix<f64>) -> Result<OlsFit> {
    let (n, k) = x.shape();
    if y.len() != n {
        return Err(PairsError::InvalidInput(format!(
            "design matrix has {} rows, response has {}",
            n,
            y.len()
        )));
    }
    if n <= k {
        return Err(PairsError::SingularRegression(format!(
            "{} observations cannot identify {} parameters",
            n, k
        )));
    }

    // Numerical rank from the singular values, relative to the largest one so
    // the check does not depend on the scale of the regressors.
    let sv = x.singular_values();
    let max_sv = sv.max();
    let min_sv = sv.min();
    if !max_sv.is_finite() || max_sv <= 0.0 || min_sv <= max_sv * n.max(k) as f64 * f64::EPSILON {
        return Err(PairsError::SingularRegression(
            "design matrix is rank deficient".to_string(),
        ));
    }

    let y_vec = DVector::from_column_slice(y);
    let xtx = x.transpose() * x;
    let xty = x.transpose() * &y_vec;

    let xtx_inv = xtx
        .cholesky()
        .map(|c| c.inverse())
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
        .ok_or_else(|| {
            PairsError::SingularRegression("design matrix is rank deficient".to_string())
        })?;

    let beta = &xtx_inv * xty;
    let residuals = &y_vec - x * &beta;
    let ssr = residuals.norm_squared();
    let sigma2 = ssr / (n - k) as f64;

    let std_errors = (0..k).map(|i| (sigma2 * xtx_inv[(i, i)]).sqrt()).collect();

    Ok(OlsFit {
        params: beta.iter().copied().collect(),
        std_errors,
        ssr,
        nobs: n,
    })
}
