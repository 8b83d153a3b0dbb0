//! Technical indicators
//!
//! Heikin-Ashi candles and exponential moving averages over close prices.
//! Both are strict sequential recurrences over an ordered series.

use tracing::debug;

use crate::error::{BacktestError, Result};
use crate::types::MarketBar;

/// Synthetic Heikin-Ashi open/close columns, aligned with the input bars
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeikinAshi {
    pub open: Vec<f64>,
    pub close: Vec<f64>,
}

/// `ha_close = (O+H+L+C)/4`, `ha_open[0] = (O+C)/2`,
/// `ha_open[i] = (ha_open[i-1] + ha_close[i-1]) / 2`.
pub fn heikin_ashi(bars: &[MarketBar]) -> Result<HeikinAshi> {
    let first = bars
        .first()
        .ok_or_else(|| BacktestError::data("cannot compute Heikin-Ashi on an empty series"))?;

    let mut ha = HeikinAshi {
        open: Vec::with_capacity(bars.len()),
        close: Vec::with_capacity(bars.len()),
    };

    let mut prev_open = (first.open + first.close) / 2.0;
    let mut prev_close = (first.open + first.high + first.low + first.close) / 4.0;
    ha.open.push(prev_open);
    ha.close.push(prev_close);

    for bar in &bars[1..] {
        let open = (prev_open + prev_close) / 2.0;
        let close = (bar.open + bar.high + bar.low + bar.close) / 4.0;
        ha.open.push(open);
        ha.close.push(close);
        prev_open = open;
        prev_close = close;
    }

    debug!(bars = bars.len(), "computed Heikin-Ashi candles");
    Ok(ha)
}

/// Exponential moving average, updated one price at a time.
///
/// Seeded with the first observation, then
/// `value = α·price + (1−α)·value` with `α = 2/(period+1)`.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(BacktestError::config("EMA period must be at least 1"));
        }
        Ok(Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
        })
    }

    /// Feed one price, return the current EMA value.
    pub fn update(&mut self, price: f64) -> f64 {
        let next = match self.value {
            None => price,
            Some(prev) => self.alpha * price + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// EMA of every value in `prices`
pub fn ema_series(prices: &[f64], period: usize) -> Result<Vec<f64>> {
    let mut ema = Ema::new(period)?;
    Ok(prices.iter().map(|&p| ema.update(p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(minute: u32, o: f64, h: f64, l: f64, c: f64) -> MarketBar {
        MarketBar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 15 + minute, 0)
                .unwrap(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: None,
        }
    }

    #[test]
    fn test_flat_bar_reduces_to_price() {
        let ha = heikin_ashi(&[bar(0, 100.0, 100.0, 100.0, 100.0)]).unwrap();
        assert_eq!(ha.open, vec![100.0]);
        assert_eq!(ha.close, vec![100.0]);
    }

    #[test]
    fn test_heikin_ashi_recurrence() {
        let bars = [bar(0, 10.0, 14.0, 8.0, 12.0), bar(1, 12.0, 16.0, 11.0, 15.0)];
        let ha = heikin_ashi(&bars).unwrap();
        assert_eq!(ha.close[0], 11.0);
        assert_eq!(ha.open[0], 11.0);
        assert_eq!(ha.close[1], 13.5);
        assert_eq!(ha.open[1], 11.0);
    }

    #[test]
    fn test_heikin_ashi_empty_is_data_error() {
        assert!(matches!(heikin_ashi(&[]), Err(BacktestError::Data(_))));
    }

    #[test]
    fn test_ema_seeded_with_first_close() {
        // alpha = 0.5
        let values = ema_series(&[10.0, 11.0, 12.0, 13.0], 3).unwrap();
        let expected = [10.0, 10.5, 11.25, 12.125];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ema_period_one_tracks_price() {
        assert_eq!(ema_series(&[3.0, 7.0, 5.0], 1).unwrap(), vec![3.0, 7.0, 5.0]);
    }

    #[test]
    fn test_ema_rejects_zero_period() {
        assert!(Ema::new(0).is_err());
        assert!(ema_series(&[1.0], 0).is_err());
    }
}
