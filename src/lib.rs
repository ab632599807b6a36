//! Pairs - statistical-arbitrage backtesting for two-asset spreads.
//!
//! # Overview
//!
//! The crate takes two aligned price histories and answers three questions:
//!
//! - **Are the two assets cointegrated?** Engle-Granger test, OLS hedge ratio,
//!   ADF on the spread and its mean-reversion half-life.
//! - **How would a z-score strategy on the spread have done?** Rolling z-score,
//!   entry/exit/stop-loss signals, volatility-scaled positions, a vectorized
//!   backtest with transaction costs, and annualized performance metrics.
//! - **Does the result survive?** A chronological walk-forward split with the
//!   hedge ratio fitted on the train segment only, and a bootstrap Monte Carlo
//!   over the realized returns.
//!
//! # Quick Start
//!
//! ```no_run
//! use pairs_backtest::{
//!     cointegration::analyze_pair,
//!     data::{load_and_align, DataConfig},
//!     strategy::{PairsStrategy, Strategy, StrategyConfig},
//! };
//!
//! let prices = load_and_align("data/KO.csv", "data/PEP.csv", "KO", "PEP", &DataConfig::default())
//!     .unwrap();
//!
//! let report = analyze_pair(&prices).unwrap();
//! println!("p-value: {:.4}, half-life: {:.1}", report.cointegration.p_value, report.half_life);
//!
//! let strategy = PairsStrategy::new(StrategyConfig::default()).unwrap();
//! let run = strategy.run(&prices).unwrap();
//! println!("Return: {:.2}%", run.metrics.total_return * 100.0);
//! ```
//!
//! # Walk-Forward and Monte Carlo
//!
//! ```
//! use pairs_backtest::{
//!     monte_carlo::{MonteCarloConfig, MonteCarloSimulator},
//!     strategy::PairsStrategy,
//!     types::AlignedPrices,
//!     walkforward::{WalkForwardConfig, WalkForwardValidator},
//! };
//!
//! let b: Vec<f64> = (0..300).map(|i| 50.0 + (i as f64 * 0.05).sin() * 5.0).collect();
//! let a: Vec<f64> = b.iter().enumerate().map(|(i, p)| 2.0 * p + (i as f64 * 0.7).sin()).collect();
//! let prices = AlignedPrices::from_values(a, b).unwrap();
//!
//! let wf = WalkForwardValidator::new(WalkForwardConfig::default())
//!     .run(&PairsStrategy::default(), &prices)
//!     .unwrap();
//!
//! let mc = MonteCarloSimulator::new(MonteCarloConfig::default().with_simulations(100).with_seed(42))
//!     .simulate(&wf.out_of_sample.returns)
//!     .unwrap();
//! assert_eq!(mc.num_simulations(), 100);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Price series, aligned pairs, hedge ratios, signals
//! - [`data`]: CSV loading and timestamp alignment
//! - [`regression`]: OLS fits used by the statistical tests
//! - [`stationarity`]: Augmented Dickey-Fuller test with MacKinnon p-values
//! - [`cointegration`]: Engle-Granger test, hedge ratios, spread, half-life
//! - [`signals`]: Z-score, threshold signals, positions, volatility scaling
//! - [`engine`]: Vectorized backtest of a position series
//! - [`analytics`]: Performance metrics and reporting
//! - [`strategy`]: Strategy trait and the z-score pairs strategy
//! - [`walkforward`]: Train/test validation
//! - [`monte_carlo`]: Bootstrap stress testing
//! - [`config`]: TOML configuration file support

pub mod analytics;
pub mod cointegration;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod monte_carlo;
pub mod regression;
pub mod signals;
pub mod stationarity;
pub mod strategy;
pub mod types;
pub mod walkforward;

// Re-exports for convenience
pub use analytics::{performance_metrics, PerformanceMetrics, ResultFormatter};
pub use cointegration::{
    analyze_pair, cointegration_test, compute_spread, estimate_hedge_ratio,
    estimate_rolling_hedge_ratio, half_life, CointegrationReport, CointegrationResult,
};
pub use config::PairsFileConfig;
pub use data::{align_prices, load_and_align, load_price_csv, DataConfig};
pub use engine::{backtest, BacktestConfig, BacktestResult};
pub use error::{PairsError, Result};
pub use monte_carlo::{MonteCarloConfig, MonteCarloResult, MonteCarloSimulator, MonteCarloSummary};
pub use signals::{
    apply_capped_volatility_scaling, compute_zscore, generate_signals, position_from_signal,
    VolatilityScaling,
};
pub use stationarity::{adf_test, stationarity_test, AdfConfig, AdfResult};
pub use strategy::{HedgeMethod, PairsStrategy, Strategy, StrategyConfig, StrategyRun};
pub use types::{AlignedPrices, Bar, HedgeRatio, PriceSeries, Signal};
pub use walkforward::{
    walk_forward_split, WalkForwardConfig, WalkForwardResult, WalkForwardValidator,
};
