//! Signal generation: EMA crossover confirmed by Heikin-Ashi colour and an
//! optional consecutive-candle pattern, gated by trading mode.

use tracing::debug;

use crate::config::StrategyConfig;
use crate::error::{BacktestError, Result};
use crate::indicators::{ema_series, heikin_ashi};
use crate::patterns::pattern_columns;
use crate::types::{DerivedBar, MarketBar, Signal, TradingMode};

/// Signal for `current` given the bar before it.
///
/// A long entry needs the short EMA to cross above the long EMA on a bullish
/// candle (and a bullish run when the pattern filter is active); a short
/// entry is the mirror. The mode then drops the side it does not trade.
pub fn classify(previous: &DerivedBar, current: &DerivedBar, mode: TradingMode) -> Signal {
    let mut long = current.ema_short > current.ema_long
        && previous.ema_short <= previous.ema_long
        && current.is_bullish();
    let mut short = current.ema_short < current.ema_long
        && previous.ema_short >= previous.ema_long
        && current.is_bearish();

    if let Some(pattern) = current.bullish_pattern {
        long &= pattern;
    }
    if let Some(pattern) = current.bearish_pattern {
        short &= pattern;
    }

    match mode {
        TradingMode::Buy | TradingMode::Swing if long => Signal::LongEntry,
        TradingMode::Sell | TradingMode::Swing if short => Signal::ShortEntry,
        _ => Signal::None,
    }
}

/// Attaches Heikin-Ashi, both EMAs, pattern columns and the signal to every
/// bar. Runs over the full series; session filtering happens afterwards.
pub fn derive_bars(config: &StrategyConfig, bars: &[MarketBar]) -> Result<Vec<DerivedBar>> {
    if let Some((index, bar)) = bars.iter().enumerate().find(|(_, b)| {
        ![b.open, b.high, b.low, b.close].iter().all(|v| v.is_finite())
    }) {
        return Err(BacktestError::data(format!(
            "non-finite price at bar {index} ({})",
            bar.timestamp
        )));
    }

    let ha = heikin_ashi(bars)?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_short = ema_series(&closes, config.ema_short_period)?;
    let ema_long = ema_series(&closes, config.ema_long_period)?;
    let patterns = config
        .pattern_length
        .map(|p| pattern_columns(&ha, p))
        .transpose()?;

    let mut derived: Vec<DerivedBar> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| DerivedBar {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            ha_open: ha.open[i],
            ha_close: ha.close[i],
            ema_short: ema_short[i],
            ema_long: ema_long[i],
            signal: Signal::None,
            bullish_pattern: patterns.as_ref().map(|(bull, _)| bull[i]),
            bearish_pattern: patterns.as_ref().map(|(_, bear)| bear[i]),
        })
        .collect();

    let mut signals = 0usize;
    for i in 1..derived.len() {
        let signal = classify(&derived[i - 1], &derived[i], config.trading_mode);
        if signal != Signal::None {
            signals += 1;
        }
        derived[i].signal = signal;
    }

    debug!(
        bars = derived.len(),
        signals,
        ema_short = config.ema_short_period,
        ema_long = config.ema_long_period,
        "derived signal columns"
    );
    Ok(derived)
}
