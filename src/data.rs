//! Price file loading and alignment.
//!
//! Price files are CSV with `timestamp,open,high,low,close,volume` columns.
//! Only the timestamp and close are kept. Each file is sorted ascending and
//! de-duplicated (first row per timestamp wins), then two series are
//! inner-joined on their timestamps into an [`AlignedPrices`] table.

use crate::error::{PairsError, Result};
use crate::types::{AlignedPrices, Bar, PriceSeries};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Raw CSV row with flexible column names.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(
        alias = "Date",
        alias = "date",
        alias = "Timestamp",
        alias = "timestamp",
        alias = "Time",
        alias = "time",
        alias = "datetime",
        alias = "Datetime"
    )]
    date: String,
    #[serde(alias = "Open", alias = "open", default)]
    open: f64,
    #[serde(alias = "High", alias = "high", default)]
    high: f64,
    #[serde(alias = "Low", alias = "low", default)]
    low: f64,
    #[serde(alias = "Close", alias = "close", alias = "Adj Close")]
    close: f64,
    #[serde(alias = "Volume", alias = "volume", default)]
    volume: f64,
}

/// Data source configuration.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Date format string for parsing (e.g., "%Y-%m-%d"). ISO-8601 is tried regardless.
    pub date_format: Option<String>,
    /// Whether the CSV has headers.
    pub has_headers: bool,
    /// CSV delimiter character.
    pub delimiter: u8,
    /// Skip unparseable rows instead of failing.
    pub skip_invalid: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            date_format: None,
            has_headers: true,
            delimiter: b',',
            skip_invalid: false,
        }
    }
}

/// Parse a timestamp string with multiple format attempts.
fn parse_datetime(s: &str, format: Option<&str>) -> Result<DateTime<Utc>> {
    let s = s.trim();

    // Reported if the fallbacks below fail too.
    let mut format_error = None;
    if let Some(fmt) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
        match NaiveDate::parse_from_str(s, fmt) {
            Ok(d) => {
                if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                    return Ok(Utc.from_utc_datetime(&dt));
                }
            }
            Err(e) => format_error = Some(e),
        }
    }

    // Offsets such as "+05:30" are normalised to UTC.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    for fmt in &["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&dt));
            }
        }
    }

    if let Some(e) = format_error {
        return Err(e.into());
    }
    Err(PairsError::DataError(format!(
        "Could not parse timestamp: '{}'",
        s
    )))
}

/// Load OHLCV bars from a CSV file, sorted ascending with duplicate
/// timestamps removed (the first occurrence in file order is kept).
pub fn load_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    info!("Loading data from: {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(config.has_headers)
        .delimiter(config.delimiter)
        .flexible(true)
        .from_path(path)?;

    let mut bars = Vec::new();
    let mut skipped = 0;

    for (row_num, result) in reader.deserialize().enumerate() {
        let row: CsvRow = match result {
            Ok(r) => r,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num + 1, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(PairsError::CsvError(e)),
        };

        let timestamp = match parse_datetime(&row.date, config.date_format.as_deref()) {
            Ok(ts) => ts,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num + 1, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        bars.push(Bar::new(
            timestamp, row.open, row.high, row.low, row.close, row.volume,
        ));
    }

    if skipped > 0 {
        warn!("Skipped {} invalid rows", skipped);
    }

    // Stable sort, so dedup below keeps the first row in file order.
    bars.sort_by_key(|b| b.timestamp);

    let original_len = bars.len();
    bars.dedup_by_key(|b| b.timestamp);
    if bars.len() < original_len {
        warn!("Removed {} duplicate timestamps", original_len - bars.len());
    }

    if bars.is_empty() {
        return Err(PairsError::NoData);
    }

    info!(
        "Loaded {} bars from {} to {}",
        bars.len(),
        bars[0].timestamp,
        bars[bars.len() - 1].timestamp
    );

    Ok(bars)
}

/// Load the close column of a price file as a named series.
pub fn load_price_csv(
    path: impl AsRef<Path>,
    name: impl Into<String>,
    config: &DataConfig,
) -> Result<PriceSeries> {
    let bars = load_csv(path, config)?;
    PriceSeries::from_bars(name, &bars)
}

/// Inner-join two series on timestamp.
///
/// Timestamps missing from either series are dropped from both. Fails with
/// `DataAlignment` when nothing overlaps or a retained close is not finite.
pub fn align_prices(a: &PriceSeries, b: &PriceSeries) -> Result<AlignedPrices> {
    let b_by_time: BTreeMap<DateTime<Utc>, f64> = b
        .points()
        .iter()
        .map(|p| (p.timestamp, p.close))
        .collect();

    let mut timestamps = Vec::with_capacity(a.len().min(b.len()));
    let mut a_closes = Vec::with_capacity(timestamps.capacity());
    let mut b_closes = Vec::with_capacity(timestamps.capacity());

    for point in a.points() {
        if let Some(&b_close) = b_by_time.get(&point.timestamp) {
            timestamps.push(point.timestamp);
            a_closes.push(point.close);
            b_closes.push(b_close);
        }
    }

    if timestamps.is_empty() {
        return Err(PairsError::DataAlignment(format!(
            "'{}' and '{}' share no timestamps",
            a.name, b.name
        )));
    }

    let dropped = a.len() + b.len() - 2 * timestamps.len();
    if dropped > 0 {
        warn!(
            "Alignment dropped {} unmatched rows ({} kept)",
            dropped,
            timestamps.len()
        );
    }

    AlignedPrices::new(a.name.clone(), b.name.clone(), timestamps, a_closes, b_closes)
}

/// Load two price files and align them.
pub fn load_and_align(
    a_path: impl AsRef<Path>,
    b_path: impl AsRef<Path>,
    a_name: &str,
    b_name: &str,
    config: &DataConfig,
) -> Result<AlignedPrices> {
    let a = load_price_csv(a_path, a_name, config)?;
    let b = load_price_csv(b_path, b_name, config)?;
    let aligned = align_prices(&a, &b)?;
    info!(
        "Aligned {} / {}: {} rows from {} to {}",
        a_name,
        b_name,
        aligned.len(),
        aligned.start(),
        aligned.end()
    );
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PricePoint;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(parse_datetime("2024-01-05", None).unwrap(), ts(5));
        assert_eq!(parse_datetime("2024-01-05 00:00:00", None).unwrap(), ts(5));
        assert_eq!(parse_datetime("2024-01-05T00:00:00Z", None).unwrap(), ts(5));
        assert_eq!(
            parse_datetime("2024-01-05T05:30:00+05:30", None).unwrap(),
            ts(5)
        );
        assert_eq!(parse_datetime("05/01/2024", Some("%d/%m/%Y")).unwrap(), ts(5));
        assert!(parse_datetime("not a date", None).is_err());
    }

    #[test]
    fn test_parse_datetime_explicit_format_error() {
        assert!(matches!(
            parse_datetime("not a date", Some("%d/%m/%Y")),
            Err(PairsError::DateParseError(_))
        ));
        assert!(matches!(
            parse_datetime("not a date", None),
            Err(PairsError::DataError(_))
        ));
        // A mismatched format still falls back to the built-in ones.
        assert_eq!(parse_datetime("2024-01-05", Some("%d/%m/%Y")).unwrap(), ts(5));
    }

    #[test]
    fn test_load_csv_sorts_and_keeps_first_duplicate() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-03,1,1,1,30.0,10\n\
             2024-01-01,1,1,1,10.0,10\n\
             2024-01-02,1,1,1,20.0,10\n\
             2024-01-02,1,1,1,99.0,10\n",
        );

        let bars = load_csv(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, ts(1));
        assert_eq!(bars[1].close, 20.0);
        assert_eq!(bars[2].close, 30.0);
    }

    #[test]
    fn test_load_csv_empty_file() {
        let file = write_csv("timestamp,open,high,low,close,volume\n");
        let result = load_csv(file.path(), &DataConfig::default());
        assert!(matches!(result, Err(PairsError::NoData)));
    }

    #[test]
    fn test_load_csv_skip_invalid() {
        let content = "timestamp,open,high,low,close,volume\n\
                       2024-01-01,1,1,1,10.0,10\n\
                       garbage,1,1,1,11.0,10\n";
        let file = write_csv(content);
        assert!(load_csv(file.path(), &DataConfig::default()).is_err());

        let config = DataConfig {
            skip_invalid: true,
            ..Default::default()
        };
        let bars = load_csv(file.path(), &config).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn test_align_prices_inner_join() {
        let gold = PriceSeries::new(
            "gold",
            vec![
                PricePoint { timestamp: ts(1), close: 100.0 },
                PricePoint { timestamp: ts(2), close: 101.0 },
                PricePoint { timestamp: ts(4), close: 103.0 },
            ],
        )
        .unwrap();
        let silver = PriceSeries::new(
            "silver",
            vec![
                PricePoint { timestamp: ts(2), close: 20.0 },
                PricePoint { timestamp: ts(3), close: 21.0 },
                PricePoint { timestamp: ts(4), close: 22.0 },
            ],
        )
        .unwrap();

        let aligned = align_prices(&gold, &silver).unwrap();
        assert_eq!(aligned.timestamps(), &[ts(2), ts(4)]);
        assert_eq!(aligned.a(), &[101.0, 103.0]);
        assert_eq!(aligned.b(), &[20.0, 22.0]);
        assert_eq!(aligned.asset_a(), "gold");
    }

    #[test]
    fn test_align_prices_no_overlap() {
        let gold = PriceSeries::new("gold", vec![PricePoint { timestamp: ts(1), close: 1.0 }]).unwrap();
        let silver = PriceSeries::new("silver", vec![PricePoint { timestamp: ts(2), close: 1.0 }]).unwrap();
        assert!(matches!(
            align_prices(&gold, &silver),
            Err(PairsError::DataAlignment(_))
        ));
    }

    #[test]
    fn test_align_prices_rejects_non_finite() {
        let gold = PriceSeries::new("gold", vec![PricePoint { timestamp: ts(1), close: f64::NAN }]).unwrap();
        let silver = PriceSeries::new("silver", vec![PricePoint { timestamp: ts(1), close: 1.0 }]).unwrap();
        assert!(matches!(
            align_prices(&gold, &silver),
            Err(PairsError::DataAlignment(_))
        ));
    }

    #[test]
    fn test_load_and_align() {
        let gold = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-01,1,1,1,100.0,10\n\
             2024-01-02,1,1,1,101.0,10\n",
        );
        let silver = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-02,1,1,1,20.0,10\n\
             2024-01-03,1,1,1,21.0,10\n",
        );
        let aligned =
            load_and_align(gold.path(), silver.path(), "gold", "silver", &DataConfig::default())
                .unwrap();
        assert_eq!(aligned.len(), 1);
        assert_eq!(aligned.a(), &[101.0]);
        assert_eq!(aligned.b(), &[20.0]);
    }
}
