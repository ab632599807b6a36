//! Integration tests for the pairs backtester.

use chrono::{Duration, TimeZone, Utc};
use pairs_backtest::analytics::performance_metrics;
use pairs_backtest::cointegration::{analyze_pair, compute_spread, half_life};
use pairs_backtest::config::PairsFileConfig;
use pairs_backtest::data::{load_and_align, DataConfig};
use pairs_backtest::monte_carlo::{MonteCarloConfig, MonteCarloSimulator};
use pairs_backtest::strategy::{HedgeMethod, PairsStrategy, Strategy, StrategyConfig};
use pairs_backtest::types::{AlignedPrices, HedgeRatio, Signal};
use pairs_backtest::walkforward::{walk_forward_split, WalkForwardConfig, WalkForwardValidator};
use std::io::Write;
use tempfile::NamedTempFile;

/// A = 2 * B + mean-reverting noise, with isolated spread shocks of
/// alternating sign at `shocks`.
fn cointegrated_pair(n: usize, shocks: &[(usize, f64)]) -> (Vec<f64>, Vec<f64>) {
    let b: Vec<f64> = (0..n)
        .map(|i| 50.0 + (i as f64 * 0.03).sin() * 10.0 + i as f64 * 0.05)
        .collect();
    let a: Vec<f64> = b
        .iter()
        .enumerate()
        .map(|(i, pb)| {
            let shock = shocks
                .iter()
                .find(|(t, _)| *t == i)
                .map_or(0.0, |(_, s)| *s);
            let jitter = ((i as f64 * 12.9898).sin() * 43758.5453).fract() * 0.1;
            2.0 * pb + (i as f64 * 0.9).sin() * 0.3 + jitter + shock
        })
        .collect();
    (a, b)
}

fn shocked_prices() -> AlignedPrices {
    let (a, b) = cointegrated_pair(100, &[(30, 1.0), (55, -1.0), (80, 1.0)]);
    AlignedPrices::from_values(a, b).unwrap()
}

#[test]
fn test_cointegrated_pair_trades_and_reverts() {
    let prices = shocked_prices();
    let config = StrategyConfig::default()
        .with_z_window(20)
        .with_thresholds(2.0, 0.5, 4.0);
    let strategy = PairsStrategy::new(config).unwrap();
    let run = strategy.run(&prices).unwrap();

    let HedgeRatio::Static(beta) = run.hedge_ratio else {
        panic!("expected a static hedge ratio");
    };
    assert!((beta - 2.0).abs() < 0.05, "beta = {}", beta);

    // Each shock opens a trade against it.
    assert_eq!(run.signals[30], Signal::Short);
    assert_eq!(run.signals[55], Signal::Long);
    assert_eq!(run.signals[80], Signal::Short);
    assert!(run.entry_signals() >= 3);

    // Exit band hit after an entry.
    let exits = (1..run.signals.len())
        .filter(|&t| !run.signals[t - 1].is_flat() && run.signals[t].is_flat())
        .count();
    assert!(exits > 0);

    assert!(run.positions.iter().any(|p| *p > 0.0));
    assert!(run.positions.iter().any(|p| *p < 0.0));
    assert!(run.backtest.num_position_changes() >= 3);
    assert_eq!(run.metrics.observations, 99);

    let spread: Vec<f64> = compute_spread(prices.a(), prices.b(), &run.hedge_ratio)
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    let hl = half_life(&spread).unwrap();
    assert!(hl > 0.0 && hl < 20.0, "half-life = {}", hl);
}

#[test]
fn test_pair_analysis_report() {
    let prices = shocked_prices();
    let report = analyze_pair(&prices).unwrap();
    assert_eq!(report.observations, 100);
    assert!((report.hedge_ratio - 2.0).abs() < 0.05);
    assert!(report.half_life > 0.0 && report.half_life < 20.0);
    assert!(report.cointegration.p_value >= 0.0 && report.cointegration.p_value <= 1.0);
}

#[test]
fn test_zero_returns_metrics() {
    let metrics = performance_metrics(&[0.0; 50], 252.0).unwrap();
    assert_eq!(metrics.total_return, 0.0);
    assert_eq!(metrics.annualized_return, Some(0.0));
    assert_eq!(metrics.annualized_volatility, Some(0.0));
    assert_eq!(metrics.sharpe_ratio, None);
    assert_eq!(metrics.max_drawdown, 0.0);
    assert_eq!(metrics.calmar_ratio, None);
    assert_eq!(metrics.observations, 50);
}

#[test]
fn test_monte_carlo_constant_series() {
    let r = 0.01;
    let n = 40;
    let returns = vec![r; n];
    let result = MonteCarloSimulator::new(MonteCarloConfig::default().with_simulations(1).with_seed(9))
        .simulate(&returns)
        .unwrap();

    assert_eq!(result.final_returns.len(), 1);
    assert_eq!(result.max_drawdowns.len(), 1);

    let compounded = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
    assert_eq!(result.final_returns[0], compounded);
    assert!((result.final_returns[0] - ((1.0 + r).powi(n as i32) - 1.0)).abs() < 1e-12);
    assert_eq!(result.max_drawdowns[0], 0.0);
}

#[test]
fn test_walk_forward_split_is_chronological() {
    let prices = shocked_prices();
    let (train, test) = walk_forward_split(&prices, 0.7).unwrap();
    assert_eq!(train.len(), 70);
    assert_eq!(test.len(), 30);
    assert!(train.timestamps().iter().all(|t| *t < test.start()));
}

#[test]
fn test_walk_forward_then_monte_carlo() {
    let (a, b) = cointegrated_pair(300, &[(60, 1.0), (110, -1.0), (230, 1.0), (270, -1.0)]);
    let prices = AlignedPrices::from_values(a, b).unwrap();
    let strategy = PairsStrategy::new(StrategyConfig::default().with_thresholds(2.0, 0.5, 4.0)).unwrap();

    let wf = WalkForwardValidator::new(WalkForwardConfig::default())
        .run(&strategy, &prices)
        .unwrap();
    assert_eq!(wf.in_sample.len, 210);
    assert_eq!(wf.out_of_sample.returns.len(), 89);

    let config = MonteCarloConfig::default().with_simulations(200).with_seed(42);
    let first = MonteCarloSimulator::new(config.clone())
        .simulate(&wf.out_of_sample.returns)
        .unwrap();
    let second = MonteCarloSimulator::new(config.with_parallel(false))
        .simulate(&wf.out_of_sample.returns)
        .unwrap();
    assert_eq!(first, second);

    let summary = first.summary(0.95).unwrap();
    assert!(summary.prob_loss >= 0.0 && summary.prob_loss <= 1.0);
    assert!(first.max_drawdowns.iter().all(|dd| *dd <= 0.0));
}

#[test]
fn test_rolling_hedge_pipeline_runs() {
    let (a, b) = cointegrated_pair(200, &[(90, 1.0), (150, -1.0)]);
    let prices = AlignedPrices::from_values(a, b).unwrap();
    let config = StrategyConfig {
        hedge: HedgeMethod::Rolling { window: 50 },
        ..StrategyConfig::default()
    };
    let run = PairsStrategy::new(config).unwrap().run(&prices).unwrap();
    assert_eq!(run.backtest.len(), 200);
    assert!(run.positions[..50].iter().all(|p| *p == 0.0));
}

fn write_prices(closes: &[f64], skip_day: Option<usize>) -> NamedTempFile {
    let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,close").unwrap();
    for (i, close) in closes.iter().enumerate() {
        if Some(i) == skip_day {
            continue;
        }
        let day = start + Duration::days(i as i64);
        writeln!(file, "{},{}", day.format("%Y-%m-%d"), close).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_csv_end_to_end() {
    let (a, b) = cointegrated_pair(120, &[(40, 1.0), (90, -1.0)]);
    let file_a = write_prices(&a, Some(10));
    let file_b = write_prices(&b, Some(70));

    let prices = load_and_align(file_a.path(), file_b.path(), "AAA", "BBB", &DataConfig::default()).unwrap();
    assert_eq!(prices.len(), 118);
    assert_eq!(prices.asset_a(), "AAA");

    let mut config = PairsFileConfig::default();
    config.data.asset_a_path = Some(file_a.path().display().to_string());
    config.data.asset_b_path = Some(file_b.path().display().to_string());
    config.backtest.transaction_cost = 0.0005;

    let strategy = PairsStrategy::new(config.to_strategy_config().unwrap()).unwrap();
    let run = strategy.run(&prices).unwrap();
    assert_eq!(run.backtest.timestamps, prices.timestamps());
    assert!(run.metrics.max_drawdown <= 0.0);
}
