//! Type definitions for the backtesting engine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

/// One OHLC row of input data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Per-bar entry signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    LongEntry,
    ShortEntry,
    None,
}

impl Signal {
    /// Side a signal asks for, if any
    pub fn side(self) -> Option<Side> {
        match self {
            Signal::LongEntry => Some(Side::Long),
            Signal::ShortEntry => Some(Side::Short),
            Signal::None => None,
        }
    }

    /// Numeric encoding used in exported tables: 1, -1 or 0
    pub fn value(self) -> i8 {
        match self {
            Signal::LongEntry => 1,
            Signal::ShortEntry => -1,
            Signal::None => 0,
        }
    }
}

/// Which directions a run may trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    Buy,
    Sell,
    Swing,
}

impl TradingMode {
    pub fn allows(self, side: Side) -> bool {
        matches!(
            (self, side),
            (TradingMode::Swing, _) | (TradingMode::Buy, Side::Long) | (TradingMode::Sell, Side::Short)
        )
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradingMode::Buy => "BUY",
            TradingMode::Sell => "SELL",
            TradingMode::Swing => "SWING",
        };
        f.write_str(s)
    }
}

impl FromStr for TradingMode {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradingMode::Buy),
            "SELL" => Ok(TradingMode::Sell),
            "SWING" => Ok(TradingMode::Swing),
            other => Err(BacktestError::config(format!(
                "invalid trading mode '{other}', expected BUY, SELL or SWING"
            ))),
        }
    }
}

/// Number of consecutive Heikin-Ashi candles required to confirm a crossover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PatternLength {
    Two,
    Three,
}

impl PatternLength {
    pub fn len(self) -> usize {
        match self {
            PatternLength::Two => 2,
            PatternLength::Three => 3,
        }
    }
}

impl TryFrom<u8> for PatternLength {
    type Error = BacktestError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(PatternLength::Two),
            3 => Ok(PatternLength::Three),
            other => Err(BacktestError::config(format!(
                "invalid candle pattern length {other}, expected 2, 3 or None"
            ))),
        }
    }
}

impl From<PatternLength> for u8 {
    fn from(value: PatternLength) -> Self {
        value.len() as u8
    }
}

/// Renders an optional pattern the way reports label it: "2", "3" or "None"
pub fn pattern_label(pattern: Option<PatternLength>) -> String {
    match pattern {
        Some(p) => p.len().to_string(),
        None => "None".to_string(),
    }
}

/// Parses "2", "3" or "None" (case-insensitive)
pub fn parse_pattern(s: &str) -> Result<Option<PatternLength>, BacktestError> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.is_empty() {
        return Ok(None);
    }
    let value: u8 = trimmed
        .parse()
        .map_err(|_| BacktestError::config(format!("invalid candle pattern '{trimmed}'")))?;
    PatternLength::try_from(value).map(Some)
}

/// Heikin-Ashi candle colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleDirection {
    Bullish,
    Bearish,
}

/// A market bar with the derived columns the simulator reads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub ha_open: f64,
    pub ha_close: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub signal: Signal,
    /// Present only when a pattern filter is configured
    pub bullish_pattern: Option<bool>,
    pub bearish_pattern: Option<bool>,
}

impl DerivedBar {
    pub fn is_bullish(&self) -> bool {
        self.ha_close > self.ha_open
    }

    pub fn is_bearish(&self) -> bool {
        self.ha_close < self.ha_open
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExitReason {
    Signal,
    StopLoss,
    TrailingStop,
    ForceExit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::Signal => "Signal",
            ExitReason::StopLoss => "StopLoss",
            ExitReason::TrailingStop => "TrailingStop",
            ExitReason::ForceExit => "ForceExit",
        };
        f.write_str(s)
    }
}

/// Live position. `water_mark` is the highest price seen for a LONG and the
/// lowest for a SHORT, starting at the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub water_mark: f64,
}

/// Completed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub side: Side,
    pub pnl: f64,
    pub duration_minutes: f64,
    pub exit_reason: ExitReason,
}

/// Return of one calendar month, in percent of the capital at month start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub month: String,
    pub return_pct: f64,
}

/// Aggregate output of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub ema_short: usize,
    pub ema_long: usize,
    pub trading_mode: TradingMode,
    pub pattern_length: Option<PatternLength>,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    /// `f64::INFINITY` when there are winners but no losing trades
    #[serde(with = "profit_factor_serde")]
    pub profit_factor: f64,
    pub total_profit: f64,
    pub final_capital: f64,
    pub return_pct: f64,
    pub max_drawdown_pct: f64,
    pub monthly_returns_avg: f64,
    pub monthly_returns_std: f64,
    pub profitable_months: usize,
    pub max_monthly_profit: f64,
    pub max_monthly_loss: f64,
    pub sharpe_ratio: f64,
    pub avg_trade_duration_minutes: f64,
    pub exit_reasons: BTreeMap<ExitReason, usize>,
    pub monthly_returns: Vec<MonthlyReturn>,
}

impl BacktestResult {
    pub fn has_infinite_profit_factor(&self) -> bool {
        self.profit_factor.is_infinite()
    }
}

/// JSON has no infinity; the sentinel travels as the string "Infinity".
pub mod profit_factor_serde {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub const INFINITY_LABEL: &str = "Infinity";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() && value.is_sign_positive() {
            serializer.serialize_str(INFINITY_LABEL)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        struct ProfitFactorVisitor;

        impl<'de> Visitor<'de> for ProfitFactorVisitor {
            type Value = f64;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a number or \"{INFINITY_LABEL}\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
                Ok(v as f64)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
                Ok(v as f64)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
                match v.to_ascii_lowercase().as_str() {
                    "infinity" | "inf" => Ok(f64::INFINITY),
                    _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(ProfitFactorVisitor)
    }
}
