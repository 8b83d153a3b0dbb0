//! Consecutive Heikin-Ashi candle runs used to confirm crossovers

use crate::error::{BacktestError, Result};
use crate::indicators::HeikinAshi;
use crate::types::{CandleDirection, PatternLength};

/// For each bar, true iff it and the previous `length - 1` candles all have
/// the given colour. Bars without enough history are false.
///
/// `length` must be 2 or 3.
pub fn detect_run(ha: &HeikinAshi, direction: CandleDirection, length: usize) -> Result<Vec<bool>> {
    if !(2..=3).contains(&length) {
        return Err(BacktestError::config(format!(
            "pattern length must be 2 or 3, got {length}"
        )));
    }

    let coloured: Vec<bool> = ha
        .open
        .iter()
        .zip(&ha.close)
        .map(|(o, c)| match direction {
            CandleDirection::Bullish => c > o,
            CandleDirection::Bearish => c < o,
        })
        .collect();

    let mut run = 0usize;
    Ok(coloured
        .iter()
        .map(|&hit| {
            run = if hit { run + 1 } else { 0 };
            run >= length
        })
        .collect())
}

/// Bullish and bearish run columns for a configured pattern
pub fn pattern_columns(ha: &HeikinAshi, pattern: PatternLength) -> Result<(Vec<bool>, Vec<bool>)> {
    Ok((
        detect_run(ha, CandleDirection::Bullish, pattern.len())?,
        detect_run(ha, CandleDirection::Bearish, pattern.len())?,
    ))
}
