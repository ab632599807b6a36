//! Error types for the pairs backtester.

use thiserror::Error;

/// Main error type for the pairs backtester.
///
/// The first three variants are structural properties of the input sample and
/// are always surfaced to the caller. Degenerate-but-valid numeric outcomes
/// (zero volatility, no drawdown) are not errors; they show up as `None` in
/// the relevant result fields instead.
#[derive(Error, Debug)]
pub enum PairsError {
    /// Price series do not overlap, or contain non-finite values.
    #[error("Data alignment error: {0}")]
    DataAlignment(String),

    /// A regression is ill-posed (zero-variance regressor, too few points, zero slope).
    #[error("Singular regression: {0}")]
    SingularRegression(String),

    /// A statistical test cannot be computed for the given sample.
    #[error("Statistical error: {0}")]
    Statistical(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("No data loaded")]
    NoData,

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Result type alias for pairs backtester operations.
pub type Result<T> = std::result::Result<T, PairsError>;
