//! Core data types for the pairs backtester.

use crate::error::{PairsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// OHLCV bar as it appears in a price file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// A single closing price at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Closing prices of one instrument, strictly increasing in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub name: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, rejecting unsorted or duplicated timestamps.
    pub fn new(name: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
        let name = name.into();
        if let Some(pos) = points
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(PairsError::DataError(format!(
                "series '{}' is not strictly increasing at index {} ({})",
                name,
                pos + 1,
                points[pos + 1].timestamp
            )));
        }
        Ok(Self { name, points })
    }

    /// Build a series from bars, keeping only timestamp and close.
    pub fn from_bars(name: impl Into<String>, bars: &[Bar]) -> Result<Self> {
        let points = bars
            .iter()
            .map(|b| PricePoint {
                timestamp: b.timestamp,
                close: b.close,
            })
            .collect();
        Self::new(name, points)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }
}

/// Two price series joined on their common timestamps.
///
/// Both columns are fully populated, finite, and share one strictly
/// increasing index. Every derived series in the crate is positionally
/// aligned with this index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedPrices {
    asset_a: String,
    asset_b: String,
    timestamps: Vec<DateTime<Utc>>,
    a: Vec<f64>,
    b: Vec<f64>,
}

impl AlignedPrices {
    /// Build a table from already-joined columns.
    pub fn new(
        asset_a: impl Into<String>,
        asset_b: impl Into<String>,
        timestamps: Vec<DateTime<Utc>>,
        a: Vec<f64>,
        b: Vec<f64>,
    ) -> Result<Self> {
        if timestamps.len() != a.len() || timestamps.len() != b.len() {
            return Err(PairsError::DataAlignment(format!(
                "column lengths differ: index {}, a {}, b {}",
                timestamps.len(),
                a.len(),
                b.len()
            )));
        }
        if timestamps.is_empty() {
            return Err(PairsError::DataAlignment(
                "no overlapping timestamps".to_string(),
            ));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(PairsError::DataAlignment(format!(
                "index is not strictly increasing at position {}",
                pos + 1
            )));
        }
        if let Some(pos) = a
            .iter()
            .zip(b.iter())
            .position(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(PairsError::DataAlignment(format!(
                "non-finite price at {}",
                timestamps[pos]
            )));
        }

        Ok(Self {
            asset_a: asset_a.into(),
            asset_b: asset_b.into(),
            timestamps,
            a,
            b,
        })
    }

    /// Build a table on a synthetic daily index starting 2020-01-01.
    ///
    /// Handy for tests and benchmarks where only the values matter.
    pub fn from_values(a: Vec<f64>, b: Vec<f64>) -> Result<Self> {
        let start = DateTime::<Utc>::from_timestamp(1_577_836_800, 0)
            .ok_or_else(|| PairsError::InvalidInput("bad epoch".to_string()))?;
        let timestamps = (0..a.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        Self::new("a", "b", timestamps, a, b)
    }

    pub fn asset_a(&self) -> &str {
        &self.asset_a
    }

    pub fn asset_b(&self) -> &str {
        &self.asset_b
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.timestamps[0]
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Copy out the rows in `range` (by position).
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(PairsError::InvalidInput(format!(
                "slice {}..{} out of bounds for {} rows",
                range.start,
                range.end,
                self.len()
            )));
        }
        Self::new(
            self.asset_a.clone(),
            self.asset_b.clone(),
            self.timestamps[range.clone()].to_vec(),
            self.a[range.clone()].to_vec(),
            self.b[range].to_vec(),
        )
    }
}

/// Linear coefficient relating leg A to leg B (`spread = A - beta * B`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HedgeRatio {
    /// One coefficient for the whole sample.
    Static(f64),
    /// One coefficient per timestamp; `None` during the warm-up window.
    Rolling(Vec<Option<f64>>),
}

impl HedgeRatio {
    /// Hedge ratio in force at position `i`.
    pub fn at(&self, i: usize) -> Option<f64> {
        match self {
            HedgeRatio::Static(beta) => Some(*beta),
            HedgeRatio::Rolling(values) => values.get(i).copied().flatten(),
        }
    }

    /// Check that a rolling ratio covers `len` points.
    pub fn check_len(&self, len: usize) -> Result<()> {
        match self {
            HedgeRatio::Rolling(values) if values.len() != len => {
                Err(PairsError::InvalidInput(format!(
                    "rolling hedge ratio has {} points, series has {}",
                    values.len(),
                    len
                )))
            }
            _ => Ok(()),
        }
    }
}

impl From<f64> for HedgeRatio {
    fn from(beta: f64) -> Self {
        HedgeRatio::Static(beta)
    }
}

/// Discrete trading signal on the spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Signal {
    /// Spread too wide: short A, long B.
    Short,
    /// No position / flatten.
    #[default]
    Flat,
    /// Spread too narrow: long A, short B.
    Long,
}

impl Signal {
    /// Numeric value in {-1, 0, +1}.
    pub fn value(self) -> f64 {
        match self {
            Signal::Short => -1.0,
            Signal::Flat => 0.0,
            Signal::Long => 1.0,
        }
    }

    pub fn is_flat(self) -> bool {
        self == Signal::Flat
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Short => write!(f, "SHORT"),
            Signal::Flat => write!(f, "FLAT"),
            Signal::Long => write!(f, "LONG"),
        }
    }
}
