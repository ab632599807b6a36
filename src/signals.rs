//! Spread z-scores, threshold signals and position sizing.

use crate::error::{PairsError, Result};
use crate::types::Signal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Mean of each trailing window of `window` points ending at the current one.
///
/// Undefined until the window is full, and wherever the window holds an
/// undefined point.
pub fn rolling_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_apply(series, window, |values| {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    })
}

/// Sample (n - 1) standard deviation over each trailing window.
pub fn rolling_std(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_apply(series, window, sample_std)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

fn rolling_apply<F>(series: &[Option<f64>], window: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut buf = Vec::with_capacity(window);
    (0..series.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            buf.clear();
            for v in &series[i + 1 - window..=i] {
                buf.push((*v)?);
            }
            f(&buf)
        })
        .collect()
}

/// Rolling z-score `(s - mean) / std` over `window` trailing points.
///
/// The first `window - 1` points are undefined, as is any point whose window
/// has zero standard deviation.
pub fn compute_zscore(spread: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    if window == 0 {
        return Err(PairsError::InvalidInput(
            "z-score window must be positive".to_string(),
        ));
    }

    let means = rolling_mean(spread, window);
    let stds = rolling_std(spread, window);

    Ok(spread
        .iter()
        .zip(means.iter().zip(stds.iter()))
        .map(|(s, (m, sd))| match (s, m, sd) {
            (Some(s), Some(m), Some(sd)) if *sd > 0.0 => Some((s - m) / sd),
            _ => None,
        })
        .collect())
}

/// Map each z-score to a signal independently of its neighbours.
///
/// Entry is assigned first (`z > entry` shorts the spread, `z < -entry` longs
/// it); the exit band `|z| < exit` and the stop-loss `|z| > max_z` then
/// overwrite it. Undefined z-scores are flat. Pass `f64::INFINITY` as
/// `max_z` to disable the stop-loss.
pub fn generate_signals(
    zscore: &[Option<f64>],
    entry_threshold: f64,
    exit_threshold: f64,
    max_z: f64,
) -> Vec<Signal> {
    let signals: Vec<Signal> = zscore
        .iter()
        .map(|z| {
            let Some(z) = *z else {
                return Signal::Flat;
            };
            let mut signal = Signal::Flat;
            if z > entry_threshold {
                signal = Signal::Short;
            } else if z < -entry_threshold {
                signal = Signal::Long;
            }
            if z.abs() < exit_threshold {
                signal = Signal::Flat;
            }
            if z.abs() > max_z {
                signal = Signal::Flat;
            }
            signal
        })
        .collect();

    debug!(
        "Signals: {} long, {} short of {}",
        signals.iter().filter(|s| **s == Signal::Long).count(),
        signals.iter().filter(|s| **s == Signal::Short).count(),
        signals.len()
    );
    signals
}

/// Hold the most recent non-flat signal; zero before the first one.
///
/// A flat signal carries the previous position forward, so flat-after-entry
/// and never-entered are indistinguishable here.
pub fn position_from_signal(signals: &[Signal]) -> Vec<f64> {
    signals
        .iter()
        .scan(0.0, |held, signal| {
            if !signal.is_flat() {
                *held = signal.value();
            }
            Some(*held)
        })
        .collect()
}

/// Volatility-targeting bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityScaling {
    /// Window of the rolling spread volatility.
    pub vol_window: usize,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for VolatilityScaling {
    fn default() -> Self {
        Self {
            vol_window: 20,
            min_scale: 0.5,
            max_scale: 1.5,
        }
    }
}

impl VolatilityScaling {
    pub fn validate(&self) -> Result<()> {
        if self.vol_window < 2 {
            return Err(PairsError::InvalidInput(format!(
                "volatility window must be at least 2, got {}",
                self.vol_window
            )));
        }
        if !(self.min_scale >= 0.0 && self.min_scale <= self.max_scale) {
            return Err(PairsError::InvalidInput(format!(
                "scale bounds [{}, {}] are not an ordered non-negative range",
                self.min_scale, self.max_scale
            )));
        }
        Ok(())
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Scale positions by `target / current` spread volatility, clipped to
/// `[min_scale, max_scale]`, where the target is the median rolling
/// volatility over the whole sample.
///
/// Points without a defined scale (volatility warm-up, undefined spread,
/// `0 / 0`) get zero exposure. Zero current volatility against a positive
/// target clips to `max_scale`.
pub fn apply_capped_volatility_scaling(
    position: &[f64],
    spread: &[Option<f64>],
    scaling: &VolatilityScaling,
) -> Result<Vec<f64>> {
    scaling.validate()?;
    if position.len() != spread.len() {
        return Err(PairsError::InvalidInput(format!(
            "position has {} points, spread has {}",
            position.len(),
            spread.len()
        )));
    }

    let vol = rolling_std(spread, scaling.vol_window);
    let mut defined: Vec<f64> = vol.iter().flatten().copied().collect();
    let Some(target) = median(&mut defined) else {
        warn!(
            "No defined spread volatility over a {}-point window; exposure is zero",
            scaling.vol_window
        );
        return Ok(vec![0.0; position.len()]);
    };
    debug!("Volatility target {:.6}", target);

    Ok(position
        .iter()
        .zip(vol.iter())
        .map(|(p, v)| {
            v.map(|current| target / current)
                .filter(|scale| !scale.is_nan())
                .map(|scale| p * scale.clamp(scaling.min_scale, scaling.max_scale))
                .unwrap_or(0.0)
        })
        .collect())
}
