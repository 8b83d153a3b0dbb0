//! Strategy parameters and the settings document they are built from
//!
//! `Settings` is the on-disk shape (JSON or YAML) with defaults for every
//! absent key. `StrategyConfig` is the validated, immutable parameter set a
//! single run consumes.

use std::fmt;
use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BacktestError, Result};
use crate::types::{parse_pattern, pattern_label, PatternLength, TradingMode};

pub const DEFAULT_MARKET_OPEN: &str = "09:15";
pub const DEFAULT_MARKET_ENTRY: &str = "09:30";
pub const DEFAULT_FORCE_EXIT: &str = "15:15";
pub const DEFAULT_MARKET_CLOSE: &str = "15:30";
pub const DEFAULT_INITIAL_CAPITAL: f64 = 25_000.0;
pub const DEFAULT_STOP_LOSS_PCT: f64 = 1.0;
pub const DEFAULT_TRAILING_STOP_PCT: f64 = 0.5;
pub const DEFAULT_SEED: u64 = 42;

/// Parses "HH:MM" or "HH:MM:SS"
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| BacktestError::config(format!("invalid time of day '{s}'")))
}

/// Trading-session boundaries, all times of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimes {
    pub market_open: NaiveTime,
    pub market_entry: NaiveTime,
    pub force_exit: NaiveTime,
    pub market_close: NaiveTime,
}

impl SessionTimes {
    /// Requires `market_open <= market_entry <= force_exit <= market_close`
    pub fn new(
        market_open: NaiveTime,
        market_entry: NaiveTime,
        force_exit: NaiveTime,
        market_close: NaiveTime,
    ) -> Result<Self> {
        let session = Self {
            market_open,
            market_entry,
            force_exit,
            market_close,
        };
        session.validate()?;
        Ok(session)
    }

    pub fn parse(market_open: &str, market_entry: &str, force_exit: &str, market_close: &str) -> Result<Self> {
        Self::new(
            parse_time_of_day(market_open)?,
            parse_time_of_day(market_entry)?,
            parse_time_of_day(force_exit)?,
            parse_time_of_day(market_close)?,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.market_open <= self.market_entry
            && self.market_entry <= self.force_exit
            && self.force_exit <= self.market_close
        {
            Ok(())
        } else {
            Err(BacktestError::config(format!(
                "session times out of order: open {} entry {} force_exit {} close {}",
                self.market_open, self.market_entry, self.force_exit, self.market_close
            )))
        }
    }

    pub fn in_trading_hours(&self, time: NaiveTime) -> bool {
        time >= self.market_open && time <= self.market_close
    }

    pub fn in_entry_window(&self, time: NaiveTime) -> bool {
        time >= self.market_entry && time < self.force_exit
    }
}

impl Default for SessionTimes {
    fn default() -> Self {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            market_open: hm(9, 15),
            market_entry: hm(9, 30),
            force_exit: hm(15, 15),
            market_close: hm(15, 30),
        }
    }
}

/// Stop-loss and trailing-stop parameters, percentages of price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSettings {
    pub use_stop_loss: bool,
    pub stop_loss_pct: f64,
    pub use_trailing_stop: bool,
    pub trailing_stop_pct: f64,
}

impl RiskSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("stop_loss_pct", self.stop_loss_pct),
            ("trailing_stop_pct", self.trailing_stop_pct),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BacktestError::config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            use_stop_loss: false,
            stop_loss_pct: DEFAULT_STOP_LOSS_PCT,
            use_trailing_stop: false,
            trailing_stop_pct: DEFAULT_TRAILING_STOP_PCT,
        }
    }
}

/// Identity of one sweep cell. Ordering is (short, long, mode, pattern) with
/// the unfiltered pattern first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Combination {
    pub ema_short: usize,
    pub ema_long: usize,
    pub trading_mode: TradingMode,
    pub pattern_length: Option<PatternLength>,
}

impl Combination {
    pub fn new(
        ema_short: usize,
        ema_long: usize,
        trading_mode: TradingMode,
        pattern_length: Option<PatternLength>,
    ) -> Self {
        Self {
            ema_short,
            ema_long,
            trading_mode,
            pattern_length,
        }
    }

    /// Stable textual key, e.g. `EMA_9_21_SWING_None`
    pub fn key(&self) -> String {
        format!(
            "EMA_{}_{}_{}_{}",
            self.ema_short,
            self.ema_long,
            self.trading_mode,
            pattern_label(self.pattern_length)
        )
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EMA({},{}) {} pattern={}",
            self.ema_short,
            self.ema_long,
            self.trading_mode,
            pattern_label(self.pattern_length)
        )
    }
}

/// Validated parameter set for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub trading_mode: TradingMode,
    pub pattern_length: Option<PatternLength>,
    pub session: SessionTimes,
    pub risk: RiskSettings,
    pub initial_capital: f64,
    /// Allow a signal exit to open the opposite position on the same bar
    pub reverse_on_signal_exit: bool,
}

impl StrategyConfig {
    pub fn new(
        combination: Combination,
        session: SessionTimes,
        risk: RiskSettings,
        initial_capital: f64,
    ) -> Result<Self> {
        let config = Self {
            ema_short_period: combination.ema_short,
            ema_long_period: combination.ema_long,
            trading_mode: combination.trading_mode,
            pattern_length: combination.pattern_length,
            session,
            risk,
            initial_capital,
            reverse_on_signal_exit: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_reverse_on_signal_exit(mut self, enabled: bool) -> Self {
        self.reverse_on_signal_exit = enabled;
        self
    }

    pub fn combination(&self) -> Combination {
        Combination::new(
            self.ema_short_period,
            self.ema_long_period,
            self.trading_mode,
            self.pattern_length,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.ema_short_period == 0 || self.ema_long_period == 0 {
            return Err(BacktestError::config(format!(
                "EMA periods must be at least 1, got ({}, {})",
                self.ema_short_period, self.ema_long_period
            )));
        }
        if self.ema_short_period >= self.ema_long_period {
            return Err(BacktestError::config(format!(
                "short EMA period {} must be less than long EMA period {}",
                self.ema_short_period, self.ema_long_period
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(BacktestError::config(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        self.session.validate()?;
        self.risk.validate()
    }
}

/// Pattern entry as written in a settings file: 2, 3, null or "None"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternToken {
    Number(u64),
    Text(String),
}

impl PatternToken {
    fn resolve(token: &Option<PatternToken>) -> Result<Option<PatternLength>> {
        match token {
            None => Ok(None),
            Some(PatternToken::Text(s)) => parse_pattern(s),
            Some(PatternToken::Number(n)) => u8::try_from(*n)
                .map_err(|_| BacktestError::config(format!("invalid candle pattern length {n}")))
                .and_then(PatternLength::try_from)
                .map(Some),
        }
    }
}

/// Sweep scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSection {
    pub mode: Vec<TradingMode>,
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            mode: vec![TradingMode::Swing, TradingMode::Buy, TradingMode::Sell],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaPatternSection {
    pub confirmation_candles: Vec<Option<PatternToken>>,
}

impl Default for HaPatternSection {
    fn default() -> Self {
        Self {
            confirmation_candles: vec![
                Some(PatternToken::Number(2)),
                Some(PatternToken::Number(3)),
                Some(PatternToken::Text("None".to_string())),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub market_open: String,
    pub market_entry: String,
    pub force_exit: String,
    pub market_close: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            market_open: DEFAULT_MARKET_OPEN.to_string(),
            market_entry: DEFAULT_MARKET_ENTRY.to_string(),
            force_exit: DEFAULT_FORCE_EXIT.to_string(),
            market_close: DEFAULT_MARKET_CLOSE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySection {
    pub ema_pairs: Vec<[usize; 2]>,
    pub trading: TradingSection,
    pub ha_patterns: HaPatternSection,
    pub trading_session: SessionSection,
    pub reverse_on_signal_exit: bool,
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            ema_pairs: vec![[9, 21], [13, 34], [21, 55]],
            trading: TradingSection::default(),
            ha_patterns: HaPatternSection::default(),
            trading_session: SessionSection::default(),
            reverse_on_signal_exit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub initial_capital: f64,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub data_folder: String,
    pub results_folder: String,
    pub timeframe: String,
    pub symbol: String,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            data_folder: "data/market_data".to_string(),
            results_folder: "data/results".to_string(),
            timeframe: "1min".to_string(),
            symbol: "NIFTY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub mode: ExecutionMode,
    pub seed: u64,
    pub max_workers: Option<usize>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            seed: DEFAULT_SEED,
            max_workers: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub strategy: StrategySection,
    pub risk_management: RiskSettings,
    pub backtest: BacktestSection,
    pub data: DataSection,
    pub execution: ExecutionSection,
    pub logging: LoggingSection,
}

impl Settings {
    /// Loads a `.json`, `.yaml` or `.yml` settings file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let settings = match extension.as_str() {
            "json" => Self::from_json(&text)?,
            "yaml" | "yml" => Self::from_yaml(&text)?,
            other => {
                return Err(BacktestError::config(format!(
                    "unsupported settings format '{other}' for {}",
                    path.display()
                )))
            }
        };
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(text).map_err(|e| BacktestError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let settings: Settings =
            serde_yaml::from_str(text).map_err(|e| BacktestError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.strategy.ema_pairs.is_empty() {
            return Err(BacktestError::config("strategy.ema_pairs must not be empty"));
        }
        if let Some(pair) = self.strategy.ema_pairs.iter().find(|p| p[0] == 0 || p[1] == 0) {
            return Err(BacktestError::config(format!(
                "EMA periods must be at least 1, got {pair:?}"
            )));
        }
        if self.strategy.trading.mode.is_empty() {
            return Err(BacktestError::config("strategy.trading.mode must not be empty"));
        }
        if self.strategy.ha_patterns.confirmation_candles.is_empty() {
            return Err(BacktestError::config(
                "strategy.ha_patterns.confirmation_candles must not be empty",
            ));
        }
        self.patterns()?;
        self.session()?;
        self.risk_management.validate()?;
        if !self.backtest.initial_capital.is_finite() || self.backtest.initial_capital <= 0.0 {
            return Err(BacktestError::config(format!(
                "backtest.initial_capital must be positive, got {}",
                self.backtest.initial_capital
            )));
        }
        if self.execution.max_workers == Some(0) {
            return Err(BacktestError::config("execution.max_workers must be at least 1"));
        }
        debug!("settings validated");
        Ok(())
    }

    pub fn session(&self) -> Result<SessionTimes> {
        let s = &self.strategy.trading_session;
        SessionTimes::parse(&s.market_open, &s.market_entry, &s.force_exit, &s.market_close)
    }

    pub fn patterns(&self) -> Result<Vec<Option<PatternLength>>> {
        self.strategy
            .ha_patterns
            .confirmation_candles
            .iter()
            .map(PatternToken::resolve)
            .collect()
    }

    /// Restricts the sweep to one trading mode
    pub fn override_mode(&mut self, mode: TradingMode) {
        self.strategy.trading.mode = vec![mode];
    }

    /// Restricts the sweep to one pattern setting
    pub fn override_pattern(&mut self, pattern: Option<PatternLength>) {
        let token = pattern.map(|p| PatternToken::Number(p.len() as u64));
        self.strategy.ha_patterns.confirmation_candles = vec![token];
    }

    /// Every (pair, mode, pattern) cell in configuration order.
    pub fn combinations(&self) -> Result<Vec<Combination>> {
        let patterns = self.patterns()?;
        let mut combinations = Vec::with_capacity(
            self.strategy.ema_pairs.len() * self.strategy.trading.mode.len() * patterns.len(),
        );
        for pair in &self.strategy.ema_pairs {
            for &mode in &self.strategy.trading.mode {
                for &pattern in &patterns {
                    combinations.push(Combination::new(pair[0], pair[1], mode, pattern));
                }
            }
        }
        Ok(combinations)
    }

    /// Builds the run configuration for one cell. Fails on cells that are
    /// individually invalid, such as a pair with short >= long.
    pub fn strategy_config(&self, combination: Combination) -> Result<StrategyConfig> {
        Ok(StrategyConfig::new(
            combination,
            self.session()?,
            self.risk_management,
            self.backtest.initial_capital,
        )?
        .with_reverse_on_signal_exit(self.strategy.reverse_on_signal_exit))
    }
}
