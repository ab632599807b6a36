//! Performance analytics and reporting.

use crate::cointegration::CointegrationReport;
use crate::engine::BacktestResult;
use crate::error::{PairsError, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Summary statistics of a return series.
///
/// Ratios are `None` where they are mathematically undefined for the sample
/// (zero volatility, no drawdown), which is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Compounded return over the whole series.
    pub total_return: f64,
    /// `(1 + total)^(periods_per_year / N) - 1`; `None` if the compounded
    /// value went negative.
    pub annualized_return: Option<f64>,
    /// Sample standard deviation scaled by `sqrt(periods_per_year)`; needs two
    /// observations.
    pub annualized_volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    /// Worst peak-to-trough decline, `<= 0`.
    pub max_drawdown: f64,
    pub calmar_ratio: Option<f64>,
    /// Number of return observations.
    pub observations: usize,
}

/// Compute [`PerformanceMetrics`] for `returns`.
pub fn performance_metrics(returns: &[f64], periods_per_year: f64) -> Result<PerformanceMetrics> {
    if returns.is_empty() {
        return Err(PairsError::InvalidInput(
            "cannot compute metrics of an empty return series".to_string(),
        ));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(PairsError::InvalidInput(
            "return series contains non-finite values".to_string(),
        ));
    }
    if !(periods_per_year.is_finite() && periods_per_year > 0.0) {
        return Err(PairsError::InvalidInput(format!(
            "periods per year must be positive, got {}",
            periods_per_year
        )));
    }

    let n = returns.len();
    let equity = equity_curve(returns);
    let total_return = equity[n - 1] - 1.0;

    let growth = 1.0 + total_return;
    let annualized_return =
        (growth >= 0.0).then(|| growth.powf(periods_per_year / n as f64) - 1.0);

    let annualized_volatility = sample_std(returns).map(|sd| sd * periods_per_year.sqrt());

    let sharpe_ratio = match (annualized_return, annualized_volatility) {
        (Some(r), Some(vol)) if vol != 0.0 => Some(r / vol),
        _ => None,
    };

    let max_drawdown = max_drawdown(&equity);
    let calmar_ratio = match annualized_return {
        Some(r) if max_drawdown != 0.0 => Some(r / max_drawdown.abs()),
        _ => None,
    };

    Ok(PerformanceMetrics {
        total_return,
        annualized_return,
        annualized_volatility,
        sharpe_ratio,
        max_drawdown,
        calmar_ratio,
        observations: n,
    })
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

/// Running product of `1 + r`.
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |value, r| {
            *value *= 1.0 + r;
            Some(*value)
        })
        .collect()
}

/// `equity / running_peak - 1` at each point. The running peak starts at the
/// first equity point, not at the capital before it.
pub fn drawdown_series(equity: &[f64]) -> Vec<f64> {
    equity
        .iter()
        .scan(f64::NEG_INFINITY, |peak: &mut f64, value| {
            *peak = peak.max(*value);
            Some(value / *peak - 1.0)
        })
        .collect()
}

/// Most negative drawdown of an equity curve; zero if it never fell.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    drawdown_series(equity).into_iter().fold(0.0, f64::min)
}

/// Characters used for sparkline rendering, ordered from low to high.
const SPARKLINE_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render values as a one-line sparkline at most `width` characters wide.
pub fn sparkline(values: &[f64], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }

    let sampled = if values.len() > width {
        downsample(values, width)
    } else {
        values.to_vec()
    };

    let min_val = sampled.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_val = sampled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max_val - min_val;

    sampled
        .iter()
        .map(|val| {
            let normalized = if range > 0.0 {
                ((val - min_val) / range).clamp(0.0, 1.0)
            } else {
                0.5
            };
            SPARKLINE_CHARS[((normalized * 7.0).round() as usize).min(7)]
        })
        .collect()
}

/// Average consecutive chunks down to `target_len` points.
fn downsample(values: &[f64], target_len: usize) -> Vec<f64> {
    let chunk_size = values.len() as f64 / target_len as f64;
    (0..target_len)
        .filter_map(|i| {
            let start = (i as f64 * chunk_size).floor() as usize;
            let end = (((i + 1) as f64 * chunk_size).ceil() as usize).min(values.len());
            (start < end).then(|| values[start..end].iter().sum::<f64>() / (end - start) as f64)
        })
        .collect()
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a full report for one backtest.
    pub fn print_report(title: &str, result: &BacktestResult, metrics: &PerformanceMetrics) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", format!(" {} ", title.to_uppercase()).bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        if let (Some(start), Some(end)) = (result.timestamps.first(), result.timestamps.last()) {
            println!(
                "  Period:           {} to {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            );
        }
        println!("  Periods:          {:>12}", metrics.observations);
        println!("  Position Changes: {:>12}", result.num_position_changes());
        println!();

        println!("{}", "Performance".bold().underline());
        println!(
            "  Final Equity:     {:>12.4}  {}",
            result.final_equity(),
            Self::format_pct_change(metrics.total_return * 100.0)
        );
        println!("  Total Return:     {:>12.2}%", metrics.total_return * 100.0);
        println!(
            "  Annual Return:    {:>12}",
            Self::format_optional_pct(metrics.annualized_return)
        );
        println!();

        println!("{}", "Risk Metrics".bold().underline());
        println!("  Max Drawdown:     {:>12.2}%", metrics.max_drawdown * 100.0);
        println!(
            "  Volatility:       {:>12}",
            Self::format_optional_pct(metrics.annualized_volatility)
        );
        println!(
            "  Sharpe Ratio:     {:>12}",
            Self::format_optional(metrics.sharpe_ratio)
        );
        println!(
            "  Calmar Ratio:     {:>12}",
            Self::format_optional(metrics.calmar_ratio)
        );
        println!();

        println!("  Equity: {}", sparkline(&result.equity_curve, 50));
        println!();
        println!("{}", "═".repeat(60).blue());
    }

    /// Print labelled metrics side by side.
    pub fn print_metrics_table(rows: &[(&str, &PerformanceMetrics)]) {
        println!("{}", Self::metrics_table(rows));
    }

    /// Render labelled metrics as a table.
    pub fn metrics_table(rows: &[(&str, &PerformanceMetrics)]) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Segment", "Periods", "Return %", "Annual %", "Vol %", "Sharpe", "Max DD %", "Calmar",
        ]);

        for (label, m) in rows {
            builder.push_record([
                label.to_string(),
                m.observations.to_string(),
                format!("{:.2}", m.total_return * 100.0),
                Self::format_optional_pct(m.annualized_return),
                Self::format_optional_pct(m.annualized_volatility),
                Self::format_optional(m.sharpe_ratio),
                format!("{:.2}", m.max_drawdown * 100.0),
                Self::format_optional(m.calmar_ratio),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Print the pair analysis.
    pub fn print_cointegration(report: &CointegrationReport) {
        let coint = &report.cointegration;
        let adf = &report.spread_stationarity;

        println!();
        println!(
            "{}",
            format!(" PAIR ANALYSIS: {} / {} ", report.asset_a, report.asset_b)
                .bold()
                .blue()
        );
        println!();
        println!("  Observations:     {:>12}", report.observations);
        println!("  Hedge Ratio:      {:>12.4}", report.hedge_ratio);
        println!("  Intercept:        {:>12.4}", report.intercept);
        println!("  Half-Life:        {:>12.2}", report.half_life);
        println!();

        let mut builder = Builder::new();
        builder.push_record(["Test", "Statistic", "p-value", "1%", "5%", "10%", "Lag"]);
        builder.push_record([
            "Engle-Granger".to_string(),
            format!("{:.4}", coint.test_statistic),
            Self::format_p_value(coint.p_value),
            format!("{:.4}", coint.critical_values.one_pct),
            format!("{:.4}", coint.critical_values.five_pct),
            format!("{:.4}", coint.critical_values.ten_pct),
            coint
                .used_lag
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
        builder.push_record([
            "ADF (spread)".to_string(),
            format!("{:.4}", adf.statistic),
            Self::format_p_value(adf.p_value),
            format!("{:.4}", adf.critical_values.one_pct),
            format!("{:.4}", adf.critical_values.five_pct),
            format!("{:.4}", adf.critical_values.ten_pct),
            adf.used_lag.to_string(),
        ]);
        println!("{}", builder.build().with(Style::rounded()));
    }

    fn format_p_value(p: f64) -> String {
        let text = format!("{:.4}", p);
        if p < 0.05 {
            text.green().to_string()
        } else {
            text.red().to_string()
        }
    }

    /// Format percentage change with color.
    fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    pub fn format_optional(value: Option<f64>) -> String {
        value
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "n/a".to_string())
    }

    pub fn format_optional_pct(value: Option<f64>) -> String {
        value
            .map(|v| format!("{:.2}%", v * 100.0))
            .unwrap_or_else(|| "n/a".to_string())
    }

    /// Export any result to pretty JSON.
    pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }
}
