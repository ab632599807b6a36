//! Command-line interface for the pairs backtester.

use pairs_backtest::analytics::ResultFormatter;
use pairs_backtest::cointegration::analyze_pair;
use pairs_backtest::config::PairsFileConfig;
use pairs_backtest::data::load_and_align;
use pairs_backtest::error::{PairsError, Result};
use pairs_backtest::monte_carlo::MonteCarloSimulator;
use pairs_backtest::strategy::{PairsStrategy, Strategy};
use pairs_backtest::types::AlignedPrices;
use pairs_backtest::walkforward::WalkForwardValidator;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Statistical-arbitrage pairs backtester.
#[derive(Parser)]
#[command(name = "pairs")]
#[command(version)]
#[command(about = "Cointegration analysis and z-score backtests for asset pairs")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Test a pair for cointegration and report its hedge ratio and half-life
    Analyze {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Run the strategy over the full sample
    Backtest {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// Fit on a train segment and evaluate on the rest
    WalkForward {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        strategy: StrategyArgs,

        /// Fraction of the sample used for training
        #[arg(long)]
        train_ratio: Option<f64>,

        /// Fixed hedge ratio instead of a train-segment fit
        #[arg(long)]
        hedge_ratio: Option<f64>,
    },

    /// Bootstrap strategy returns to stress-test the result
    MonteCarlo {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        strategy: StrategyArgs,

        /// Which returns to resample
        #[arg(long, value_enum, default_value = "walk-forward")]
        source: ReturnSource,

        /// Number of simulated paths
        #[arg(short = 'n', long)]
        simulations: Option<usize>,

        /// Random seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Confidence level for VaR and CVaR
        #[arg(long)]
        confidence: Option<f64>,

        /// Run on one thread
        #[arg(long)]
        serial: bool,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Load and align a pair of price files
    Validate {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "pairs.toml")]
        output: PathBuf,
    },
}

/// Where the price data comes from. Explicit paths override the config file.
#[derive(Args, Clone, Default)]
pub struct DataArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Price CSV of the dependent leg
    #[arg(short = 'a', long)]
    pub asset_a: Option<PathBuf>,

    /// Price CSV of the hedge leg
    #[arg(short = 'b', long)]
    pub asset_b: Option<PathBuf>,

    /// Display name of the dependent leg
    #[arg(long)]
    pub name_a: Option<String>,

    /// Display name of the hedge leg
    #[arg(long)]
    pub name_b: Option<String>,

    /// Date format of both CSVs (e.g. %Y-%m-%d)
    #[arg(long)]
    pub date_format: Option<String>,
}

/// Strategy overrides on top of the config file.
#[derive(Args, Clone, Default)]
pub struct StrategyArgs {
    /// Use a rolling hedge ratio over this many points
    #[arg(long)]
    pub hedge_window: Option<usize>,

    /// Z-score rolling window
    #[arg(short, long)]
    pub z_window: Option<usize>,

    /// Entry threshold on |z|
    #[arg(long)]
    pub entry: Option<f64>,

    /// Exit threshold on |z|
    #[arg(long)]
    pub exit: Option<f64>,

    /// Stop-loss threshold on |z|
    #[arg(long)]
    pub max_z: Option<f64>,

    /// Disable the stop-loss
    #[arg(long, conflicts_with = "max_z")]
    pub no_stop: bool,

    /// Trade unit positions without volatility scaling
    #[arg(long)]
    pub no_scaling: bool,

    /// Transaction cost per unit of position change
    #[arg(long)]
    pub cost: Option<f64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ReturnSource {
    /// Out-of-sample returns of a walk-forward run
    WalkForward,
    /// Returns of a full-sample backtest
    FullSample,
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("A tracing subscriber is already installed");
        }
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Analyze { data } => run_analyze(data, cli.output),

        Commands::Backtest { data, strategy } => run_backtest(data, strategy, cli.output),

        Commands::WalkForward {
            data,
            strategy,
            train_ratio,
            hedge_ratio,
        } => {
            let mut config = resolve_config(data, strategy)?;
            if let Some(ratio) = train_ratio {
                config.walk_forward.train_ratio = *ratio;
            }
            if hedge_ratio.is_some() {
                config.walk_forward.hedge_ratio = *hedge_ratio;
            }
            run_walk_forward(&config, cli.output)
        }

        Commands::MonteCarlo {
            data,
            strategy,
            source,
            simulations,
            seed,
            confidence,
            serial,
            progress,
        } => {
            let mut config = resolve_config(data, strategy)?;
            let mc = &mut config.monte_carlo;
            if let Some(n) = simulations {
                mc.num_simulations = *n;
            }
            if seed.is_some() {
                mc.seed = *seed;
            }
            if let Some(level) = confidence {
                mc.confidence_level = *level;
            }
            if *serial {
                mc.parallel = false;
            }
            run_monte_carlo(&config, *source, *progress, cli.output)
        }

        Commands::Validate { data } => validate_data(data),

        Commands::Init { output } => init_config(output),
    }
}

/// Load the config file if any and apply command-line overrides.
fn resolve_config(data: &DataArgs, strategy: &StrategyArgs) -> Result<PairsFileConfig> {
    let mut config = match &data.config {
        Some(path) => PairsFileConfig::load(path)?,
        None => PairsFileConfig::default(),
    };

    let d = &mut config.data;
    if let Some(path) = &data.asset_a {
        d.asset_a_path = Some(path.display().to_string());
    }
    if let Some(path) = &data.asset_b {
        d.asset_b_path = Some(path.display().to_string());
    }
    if let Some(name) = &data.name_a {
        d.asset_a_name = name.clone();
    }
    if let Some(name) = &data.name_b {
        d.asset_b_name = name.clone();
    }
    if data.date_format.is_some() {
        d.date_format = data.date_format.clone();
    }

    if let Some(window) = strategy.hedge_window {
        config.hedge.method = "rolling".to_string();
        config.hedge.window = window;
    }
    let s = &mut config.signal;
    if let Some(window) = strategy.z_window {
        s.z_window = window;
    }
    if let Some(entry) = strategy.entry {
        s.entry_threshold = entry;
    }
    if let Some(exit) = strategy.exit {
        s.exit_threshold = exit;
    }
    if strategy.max_z.is_some() {
        s.max_z = strategy.max_z;
    }
    if strategy.no_stop {
        s.max_z = None;
    }
    if strategy.no_scaling {
        config.scaling.enabled = false;
    }
    if let Some(cost) = strategy.cost {
        config.backtest.transaction_cost = cost;
    }

    Ok(config)
}

fn load_prices(config: &PairsFileConfig) -> Result<AlignedPrices> {
    let data = &config.data;
    let (a_path, b_path) = match (&data.asset_a_path, &data.asset_b_path) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(PairsError::ConfigError(
                "Both asset price files are required (--asset-a/--asset-b or [data] in the config)"
                    .to_string(),
            ))
        }
    };

    info!("Loading {} from: {}", data.asset_a_name, a_path);
    info!("Loading {} from: {}", data.asset_b_name, b_path);
    load_and_align(
        a_path,
        b_path,
        &data.asset_a_name,
        &data.asset_b_name,
        &config.data_config(),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", ResultFormatter::to_json(value)?);
    Ok(())
}

fn run_analyze(data: &DataArgs, output: OutputFormat) -> Result<()> {
    let config = resolve_config(data, &StrategyArgs::default())?;
    let prices = load_prices(&config)?;
    let report = analyze_pair(&prices)?;

    match output {
        OutputFormat::Text => {
            ResultFormatter::print_cointegration(&report);
            let verdict = if report.cointegration.is_cointegrated(0.05) {
                "cointegrated at 5%"
            } else {
                "not cointegrated at 5%"
            };
            println!("\n  {} / {}: {}", report.asset_a, report.asset_b, verdict);
            Ok(())
        }
        OutputFormat::Json => print_json(&report),
    }
}

fn run_backtest(data: &DataArgs, strategy: &StrategyArgs, output: OutputFormat) -> Result<()> {
    let config = resolve_config(data, strategy)?;
    let prices = load_prices(&config)?;
    let strategy = PairsStrategy::new(config.to_strategy_config()?)?;

    info!("Running {} on {} points", strategy.name(), prices.len());
    let run = strategy.run(&prices)?;

    match output {
        OutputFormat::Text => {
            let title = format!("{} / {} backtest", prices.asset_a(), prices.asset_b());
            ResultFormatter::print_report(&title, &run.backtest, &run.metrics);
            println!("\nParameters:");
            for (name, value) in strategy.parameters() {
                println!("  {:<18}{}", name, value);
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&run),
    }
}

fn run_walk_forward(config: &PairsFileConfig, output: OutputFormat) -> Result<()> {
    let prices = load_prices(config)?;
    let strategy = PairsStrategy::new(config.to_strategy_config()?)?;
    let result = WalkForwardValidator::new(config.to_walk_forward_config()).run(&strategy, &prices)?;

    match output {
        OutputFormat::Text => {
            println!("{}\n", result.summary());
            ResultFormatter::print_metrics_table(&[
                ("In-sample", &result.in_sample.metrics),
                ("Out-of-sample", &result.out_of_sample.metrics),
            ]);
            Ok(())
        }
        OutputFormat::Json => print_json(&result),
    }
}

fn run_monte_carlo(
    config: &PairsFileConfig,
    source: ReturnSource,
    progress: bool,
    output: OutputFormat,
) -> Result<()> {
    let prices = load_prices(config)?;
    let strategy = PairsStrategy::new(config.to_strategy_config()?)?;

    let returns = match source {
        ReturnSource::WalkForward => {
            WalkForwardValidator::new(config.to_walk_forward_config())
                .run(&strategy, &prices)?
                .out_of_sample
                .returns
        }
        ReturnSource::FullSample => strategy.run(&prices)?.backtest.realized_returns().to_vec(),
    };
    if returns.iter().all(|r| *r == 0.0) {
        warn!("All {:?} returns are zero; every simulated path is flat", source);
    }

    let mc_config = config.to_monte_carlo_config().with_progress(progress);
    let confidence = mc_config.confidence_level;
    let result = MonteCarloSimulator::new(mc_config).simulate(&returns)?;
    let summary = result.summary(confidence)?;

    match output {
        OutputFormat::Text => {
            println!("{}", summary.summary());
            println!("  Seed: {}", result.seed);
            Ok(())
        }
        OutputFormat::Json => print_json(&summary),
    }
}

fn validate_data(data: &DataArgs) -> Result<()> {
    let config = resolve_config(data, &StrategyArgs::default())?;
    let prices = load_prices(&config)?;

    println!("\nData Summary:");
    println!("  Rows: {}", prices.len());
    println!("  Start: {}", prices.start());
    println!("  End: {}", prices.end());

    for (name, closes) in [(prices.asset_a(), prices.a()), (prices.asset_b(), prices.b())] {
        let min_price = closes.iter().fold(f64::INFINITY, |a: f64, &b| a.min(b));
        let max_price = closes.iter().fold(f64::NEG_INFINITY, |a: f64, &b| a.max(b));
        let avg_price: f64 = closes.iter().sum::<f64>() / closes.len() as f64;
        println!(
            "  {}: range {:.2} - {:.2}, average {:.2}",
            name, min_price, max_price, avg_price
        );
    }

    println!("\nValidation: PASSED");
    Ok(())
}

fn init_config(output: &PathBuf) -> Result<()> {
    if output.exists() {
        return Err(PairsError::ConfigError(format!(
            "{} already exists",
            output.display()
        )));
    }
    fs::write(output, PairsFileConfig::example())?;
    println!("Created example configuration: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from([
            "pairs", "-vv", "backtest", "-a", "a.csv", "-b", "b.csv", "--entry", "1.5", "--no-scaling",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Backtest { data, strategy } => {
                assert_eq!(data.asset_a, Some(PathBuf::from("a.csv")));
                assert_eq!(strategy.entry, Some(1.5));
                assert!(strategy.no_scaling);
            }
            _ => panic!("expected backtest"),
        }
    }

    #[test]
    fn test_monte_carlo_parse() {
        let cli = Cli::try_parse_from([
            "pairs", "-o", "json", "monte-carlo", "-c", "pairs.toml", "--source", "full-sample", "-n",
            "50", "--seed", "3",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_stop_flags_conflict() {
        let cli = Cli::try_parse_from(["pairs", "backtest", "--max-z", "3", "--no-stop"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_overrides_apply_on_defaults() {
        let data = DataArgs {
            asset_a: Some(PathBuf::from("x.csv")),
            name_b: Some("PEP".to_string()),
            ..Default::default()
        };
        let strategy = StrategyArgs {
            hedge_window: Some(30),
            no_stop: true,
            cost: Some(0.002),
            ..Default::default()
        };
        let config = resolve_config(&data, &strategy).unwrap();
        assert_eq!(config.data.asset_a_path.as_deref(), Some("x.csv"));
        assert_eq!(config.data.asset_b_name, "PEP");
        assert_eq!(config.hedge.method, "rolling");
        assert_eq!(config.signal.max_z, None);
        assert_eq!(config.backtest.transaction_cost, 0.002);
    }

    #[test]
    fn test_missing_paths_rejected() {
        let config = PairsFileConfig::default();
        assert!(matches!(load_prices(&config), Err(PairsError::ConfigError(_))));
    }
}
