//! Decimal rounding for persisted numbers
//!
//! Simulation runs in `f64`; values are only rounded when written out, so
//! exported text is stable and free of binary-float noise such as
//! `0.30000000000000004`.

use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

/// Rounding rule applied when a value is cut to a fixed number of places
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingMode {
    /// Banker's rounding
    #[default]
    NearestEven,
    NearestAway,
    TowardZero,
    TowardPositive,
    TowardNegative,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::NearestEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::NearestAway => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::TowardZero => RoundingStrategy::ToZero,
            RoundingMode::TowardPositive => RoundingStrategy::ToPositiveInfinity,
            RoundingMode::TowardNegative => RoundingStrategy::ToNegativeInfinity,
        }
    }
}

/// Decimal places per kind of exported value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionConfig {
    pub price_dp: u32,
    pub money_dp: u32,
    pub pct_dp: u32,
    pub ratio_dp: u32,
    pub rounding_mode: RoundingMode,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            price_dp: 2,
            money_dp: 2,
            pct_dp: 4,
            ratio_dp: 4,
            rounding_mode: RoundingMode::NearestEven,
        }
    }
}

impl PrecisionConfig {
    pub fn price(&self, value: f64) -> String {
        format_fixed(value, self.price_dp, self.rounding_mode)
    }

    pub fn money(&self, value: f64) -> String {
        format_fixed(value, self.money_dp, self.rounding_mode)
    }

    pub fn pct(&self, value: f64) -> String {
        format_fixed(value, self.pct_dp, self.rounding_mode)
    }

    pub fn ratio(&self, value: f64) -> String {
        format_fixed(value, self.ratio_dp, self.rounding_mode)
    }
}

/// `None` for values a `Decimal` cannot hold (non-finite or out of range).
pub fn round_f64(value: f64, dp: u32, mode: RoundingMode) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp_with_strategy(dp, mode.strategy()))
}

/// Fixed-point text for CSV cells. Infinities become `inf` / `-inf`, NaN
/// becomes `nan`, so the cells still parse back as `f64`.
pub fn format_fixed(value: f64, dp: u32, mode: RoundingMode) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    match round_f64(value, dp, mode) {
        Some(d) => {
            let d = if d.is_zero() { Decimal::ZERO } else { d };
            format!("{:.*}", dp as usize, d)
        }
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_precision_rounding() {
        assert_eq!(round_f64(1.23456789, 4, RoundingMode::NearestEven), Some(dec!(1.2346)));
        assert_eq!(round_f64(2.5, 0, RoundingMode::NearestEven), Some(dec!(2)));
        assert_eq!(round_f64(2.5, 0, RoundingMode::NearestAway), Some(dec!(3)));
        assert_eq!(round_f64(-1.27, 1, RoundingMode::TowardZero), Some(dec!(-1.2)));
        assert_eq!(round_f64(f64::INFINITY, 2, RoundingMode::NearestEven), None);
    }

    #[test]
    fn test_fixed_formatting() {
        let mode = RoundingMode::NearestEven;
        assert_eq!(format_fixed(0.1 + 0.2, 4, mode), "0.3000");
        assert_eq!(format_fixed(25_000.0, 2, mode), "25000.00");
        assert_eq!(format_fixed(-0.0001, 2, mode), "0.00");
        assert_eq!(format_fixed(f64::INFINITY, 4, mode), "inf");
        assert_eq!(format_fixed(f64::NAN, 4, mode), "nan");
        assert_eq!("inf".parse::<f64>().unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_config_helpers() {
        let precision = PrecisionConfig::default();
        assert_eq!(precision.price(101.005), "101.00");
        assert_eq!(precision.pct(12.345678), "12.3457");
    }
}
