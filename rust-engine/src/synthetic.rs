//! Seeded synthetic intraday data for tests, benches and demos
//!
//! The generator never touches a global RNG: callers hand in their own
//! generator, or a seed for a fresh `Pcg64`.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use rand::distributions::Distribution;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use tracing::debug;

use crate::error::{BacktestError, Result};
use crate::types::MarketBar;

/// Shape of a generated series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub start_date: NaiveDate,
    /// Calendar days to cover; weekends are skipped
    pub days: u32,
    pub interval_minutes: u32,
    /// Per-bar standard deviation of returns
    pub volatility: f64,
    pub initial_price: f64,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            days: 30,
            interval_minutes: 1,
            volatility: 0.001,
            initial_price: 18_000.0,
            market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl SyntheticSpec {
    fn validate(&self) -> Result<()> {
        if self.interval_minutes == 0 {
            return Err(BacktestError::config("interval_minutes must be at least 1"));
        }
        if !(self.volatility.is_finite() && self.volatility > 0.0) {
            return Err(BacktestError::config("volatility must be positive"));
        }
        if !(self.initial_price.is_finite() && self.initial_price > 0.0) {
            return Err(BacktestError::config("initial_price must be positive"));
        }
        if self.market_open > self.market_close {
            return Err(BacktestError::config("market_open must not be after market_close"));
        }
        Ok(())
    }
}

/// Generates bars with `rng`. Prices follow a random walk with a slow
/// sinusoidal drift and are floored at a tenth of the initial price.
pub fn generate<R: Rng + ?Sized>(spec: &SyntheticSpec, rng: &mut R) -> Result<Vec<MarketBar>> {
    spec.validate()?;
    let normal = |sd: f64| Normal::new(0.0, sd).map_err(|e| BacktestError::config(e.to_string()));
    let step = normal(spec.volatility)?;
    let wick = normal(spec.volatility / 2.0)?;
    let volume_dist = Normal::new(1_000_000.0, 500_000.0).map_err(|e| BacktestError::config(e.to_string()))?;

    let floor = spec.initial_price * 0.1;
    let mut bars = Vec::new();
    let mut prev_close = spec.initial_price;

    for day in 0..spec.days {
        let date = spec.start_date + Duration::days(i64::from(day));
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let mut ts = date.and_time(spec.market_open);
        let close_ts = date.and_time(spec.market_close);
        while ts <= close_ts {
            let i = bars.len() as f64;
            let drift = 0.0001 * prev_close * (i / 100.0).sin();
            let close = if bars.is_empty() {
                spec.initial_price
            } else {
                (prev_close + step.sample(rng) * prev_close + drift).max(floor)
            };
            let open = if bars.is_empty() {
                close * (1.0 + wick.sample(rng) / 2.0)
            } else {
                prev_close
            };
            let high = (close * (1.0 + wick.sample(rng).abs())).max(open).max(close);
            let low = (close * (1.0 - wick.sample(rng).abs())).min(open).min(close);
            let volume: f64 = volume_dist.sample(rng);

            bars.push(MarketBar {
                timestamp: ts,
                open,
                high,
                low,
                close,
                volume: Some(volume.max(0.0).round()),
            });
            prev_close = close;
            ts += Duration::minutes(i64::from(spec.interval_minutes));
        }
    }

    if bars.is_empty() {
        return Err(BacktestError::data("no weekday falls inside the requested range"));
    }
    debug!(bars = bars.len(), "generated synthetic series");
    Ok(bars)
}

/// Same as [`generate`] with a fresh `Pcg64` seeded from `seed`.
pub fn generate_seeded(spec: &SyntheticSpec, seed: u64) -> Result<Vec<MarketBar>> {
    let mut rng = Pcg64::seed_from_u64(seed);
    generate(spec, &mut rng)
}
