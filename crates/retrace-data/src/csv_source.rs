//! CSV data source.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, warn};

use retrace_core::error::DataError;
use retrace_core::traits::{ensure_ascending, ensure_valid_prices, DataSource};
use retrace_core::types::{Bar, Timeframe};

/// CSV record format.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(
        alias = "Date",
        alias = "timestamp",
        alias = "Timestamp",
        alias = "time",
        alias = "Time",
        alias = "datetime",
        alias = "open_time",
        alias = "Open time"
    )]
    date: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close", alias = "Adj Close")]
    close: f64,
    #[serde(alias = "Volume", default)]
    volume: f64,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

/// Parse a timestamp cell into Unix milliseconds (UTC).
///
/// Accepts RFC 3339, common date and date-time layouts, and Unix epochs in
/// seconds or milliseconds.
pub fn parse_timestamp(value: &str) -> Result<i64, DataError> {
    let value = value.trim();

    if let Ok(ts) = value.parse::<i64>() {
        // Assume milliseconds if > 10 digits
        return Ok(if ts.abs() > 10_000_000_000 { ts } else { ts * 1000 });
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc().timestamp_millis());
            }
        }
    }

    Err(DataError::ParseError(format!("Could not parse date: {}", value)))
}

/// Parse CSV bars from any reader.
///
/// Rows are sorted by timestamp; duplicate timestamps and invalid prices
/// are errors.
pub fn parse_bars<R: Read>(reader: R) -> Result<Vec<Bar>, DataError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (row, result) in reader.deserialize().enumerate() {
        let record: CsvRecord =
            result.map_err(|e| DataError::ParseError(format!("row {}: {}", row + 1, e)))?;
        let timestamp = parse_timestamp(&record.date)?;
        bars.push(Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    bars.sort_by_key(|b| b.timestamp);
    ensure_ascending(&bars)?;
    ensure_valid_prices(&bars)?;

    Ok(bars)
}

/// Read and validate the bars in one CSV file.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = std::fs::File::open(path)
        .map_err(|e| DataError::Internal(format!("{}: {}", path.display(), e)))?;
    let bars = parse_bars(file)
        .map_err(|e| DataError::ParseError(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), bars = bars.len(), "Loaded CSV");
    Ok(bars)
}

/// Split a file stem like `SOLUSDT_15m` into symbol and timeframe.
fn parse_stem(stem: &str) -> (String, Option<Timeframe>) {
    if let Some((symbol, suffix)) = stem.rsplit_once('_') {
        if let Ok(tf) = Timeframe::from_str(suffix) {
            return (symbol.to_uppercase(), Some(tf));
        }
    }
    (stem.to_uppercase(), None)
}

/// CSV data source for historical data.
///
/// Each symbol maps to one or more files. A file named `SYMBOL_TF.csv`
/// serves only that timeframe; `SYMBOL.csv` serves any.
#[derive(Debug, Clone, Default)]
pub struct CsvDataSource {
    files: BTreeMap<String, Vec<(Option<Timeframe>, PathBuf)>>,
}

impl CsvDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source serving a single file for `symbol`, any timeframe.
    pub fn from_file(symbol: &str, path: impl Into<PathBuf>) -> Result<Self, DataError> {
        Self::new().with_file(symbol, None, path)
    }

    /// Register every `*.csv` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, DataError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| DataError::Internal(format!("{}: {}", dir.display(), e)))?;

        let mut source = Self::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DataError::Internal(e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping file with non UTF-8 name");
                continue;
            };
            let (symbol, timeframe) = parse_stem(stem);
            source = source.with_file(&symbol, timeframe, path.clone())?;
        }

        if source.files.is_empty() {
            return Err(DataError::NoDataAvailable);
        }
        Ok(source)
    }

    /// Add a file for `symbol`, optionally limited to one timeframe.
    pub fn with_file(
        mut self,
        symbol: &str,
        timeframe: Option<Timeframe>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, DataError> {
        let path = path.into();
        if !path.exists() {
            return Err(DataError::Internal(format!("{}: file not found", path.display())));
        }
        self.files
            .entry(symbol.to_string())
            .or_default()
            .push((timeframe, path));
        Ok(self)
    }

    fn path_for(&self, symbol: &str, timeframe: Timeframe) -> Option<&Path> {
        let files = self.files.get(symbol)?;
        files
            .iter()
            .find(|(tf, _)| *tf == Some(timeframe))
            .or_else(|| files.iter().find(|(tf, _)| tf.is_none()))
            .map(|(_, path)| path.as_path())
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    async fn load_bars(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Bar>, DataError> {
        let path = self
            .path_for(symbol, timeframe)
            .ok_or_else(|| DataError::SymbolNotFound(format!("{} ({})", symbol, timeframe)))?;
        let bars = read_bars(path)?;
        if bars.is_empty() {
            return Err(DataError::NoDataAvailable);
        }
        Ok(bars)
    }

    async fn symbols(&self) -> Result<Vec<String>, DataError> {
        Ok(self.files.keys().cloned().collect())
    }

    fn name(&self) -> &str {
        "CSV"
    }
}
