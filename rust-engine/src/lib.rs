//! EMA crossover / Heikin-Ashi intraday backtesting engine
//!
//! Derives Heikin-Ashi candles and two EMAs from an OHLC series, turns
//! crossovers into entry signals, walks the session bar by bar and reduces
//! the resulting trades to performance metrics. Every run is deterministic
//! for a fixed configuration and series, so sweeps may run sequentially or
//! in parallel with identical results.

use tracing::info;

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod indicators;
pub mod metrics;
pub mod monthly;
pub mod patterns;
pub mod precision;
pub mod signals;
pub mod simulator;
pub mod summary;
pub mod sweep;
pub mod synthetic;
pub mod types;
pub mod versioning;

pub use config::{Combination, ExecutionMode, RiskSettings, SessionTimes, Settings, StrategyConfig};
pub use error::{BacktestError, ErrorKind, Result};
pub use types::*;

/// Runs one backtest.
///
/// Indicators and signals are computed over the whole series; only bars
/// inside `[market_open, market_close]` reach the simulator. A position
/// still open when the data ends is not reported as a trade.
pub fn run_backtest(config: &StrategyConfig, bars: &[MarketBar]) -> Result<(BacktestResult, Vec<Trade>)> {
    config.validate()?;

    let derived = signals::derive_bars(config, bars)?;
    let outcome = simulator::simulate(config, &derived)?;
    let result = metrics::aggregate(config, &outcome);

    info!(
        combination = %config.combination(),
        bars = outcome.bars_processed,
        trades = result.total_trades,
        return_pct = result.return_pct,
        "backtest complete"
    );
    Ok((result, outcome.trades))
}
