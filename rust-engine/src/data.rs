//! Market data ingestion
//!
//! Reads OHLC bars from CSV with case-insensitive headers (`date`, `open`,
//! `high`, `low`, `close`, optional `volume`), sorts them ascending and
//! rejects duplicate timestamps and non-finite prices.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{BacktestError, Result};
use crate::types::MarketBar;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Date range and size of a loaded series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    /// Distinct calendar days with at least one bar
    pub total_days: usize,
    pub total_candles: usize,
}

/// Ordered, duplicate-free bars plus their metadata
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSeries {
    pub bars: Vec<MarketBar>,
    pub metadata: SeriesMetadata,
}

impl MarketSeries {
    /// Sorts `bars` by timestamp and validates them.
    pub fn from_bars(mut bars: Vec<MarketBar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(BacktestError::data("market data is empty"));
        }
        if let Some(bar) = bars
            .iter()
            .find(|b| ![b.open, b.high, b.low, b.close].iter().all(|v| v.is_finite()))
        {
            return Err(BacktestError::data(format!("non-finite price at {}", bar.timestamp)));
        }

        bars.sort_by_key(|b| b.timestamp);
        if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(BacktestError::data(format!(
                "duplicate timestamp {}",
                pair[0].timestamp
            )));
        }

        let days: BTreeSet<_> = bars.iter().map(|b| b.timestamp.date()).collect();
        let metadata = SeriesMetadata {
            start_date: bars[0].timestamp,
            end_date: bars[bars.len() - 1].timestamp,
            total_days: days.len(),
            total_candles: bars.len(),
        };
        Ok(Self { bars, metadata })
    }
}

/// Parses a timestamp in any of the accepted layouts. Offsets such as
/// `+05:30` are dropped and the local wall-clock time kept.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts);
        }
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z"))
        .map(|dt| dt.naive_local())
        .map_err(|_| BacktestError::Parse(format!("unrecognised timestamp '{s}'")))
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<String> = header.split(',').map(|h| unquote(h).to_ascii_lowercase()).collect();
        let find = |name: &str| names.iter().position(|n| n == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| BacktestError::data(format!("missing required column '{name}'")))
        };
        Ok(Self {
            date: require("date")?,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: find("volume"),
        })
    }
}

/// Parses CSV text into a validated series.
pub fn parse_csv(text: &str) -> Result<MarketSeries> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines
        .next()
        .ok_or_else(|| BacktestError::data("market data file is empty"))?;
    let columns = Columns::from_header(header)?;

    let mut bars = Vec::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split(',').map(unquote).collect();
        let field = |idx: usize| {
            fields.get(idx).copied().ok_or_else(|| {
                BacktestError::Parse(format!("line {}: expected at least {} fields", line_no + 1, idx + 1))
            })
        };
        let number = |idx: usize| -> Result<f64> {
            let raw = field(idx)?;
            raw.parse::<f64>()
                .map_err(|_| BacktestError::Parse(format!("line {}: invalid number '{raw}'", line_no + 1)))
        };

        let volume = match columns.volume {
            Some(idx) if fields.get(idx).is_some_and(|v| !v.is_empty()) => Some(number(idx)?),
            _ => None,
        };
        bars.push(MarketBar {
            timestamp: parse_timestamp(field(columns.date)?)?,
            open: number(columns.open)?,
            high: number(columns.high)?,
            low: number(columns.low)?,
            close: number(columns.close)?,
            volume,
        });
    }

    debug!(rows = bars.len(), "parsed market data rows");
    MarketSeries::from_bars(bars)
}

/// Loads and validates a CSV file of bars.
pub fn load_csv(path: impl AsRef<Path>) -> Result<MarketSeries> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let series = parse_csv(&text)?;
    info!(
        path = %path.display(),
        candles = series.metadata.total_candles,
        start = %series.metadata.start_date,
        end = %series.metadata.end_date,
        "loaded market data"
    );
    Ok(series)
}

/// `{data_folder}/{symbol}_{timeframe}.csv`
pub fn default_data_path(settings: &Settings) -> PathBuf {
    Path::new(&settings.data.data_folder)
        .join(format!("{}_{}.csv", settings.data.symbol, settings.data.timeframe))
}

/// Renders bars in the layout [`parse_csv`] reads.
pub fn to_csv(bars: &[MarketBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for bar in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume.map(|v| v.to_string()).unwrap_or_default()
        ));
    }
    out
}
