//! Calendar-month return bucketing alongside the bar loop

use chrono::{Datelike, NaiveDateTime};

use crate::types::MonthlyReturn;

/// Tracks capital at the start of each calendar month and snapshots the
/// month's return when the next month begins.
#[derive(Debug, Clone)]
pub struct MonthlyTracker {
    current: Option<(i32, u32)>,
    month_start_capital: f64,
    returns: Vec<MonthlyReturn>,
}

impl MonthlyTracker {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            current: None,
            month_start_capital: initial_capital,
            returns: Vec::new(),
        }
    }

    /// Call once per bar, before any exit on that bar changes `capital`.
    pub fn observe(&mut self, timestamp: NaiveDateTime, capital: f64) {
        let month = (timestamp.year(), timestamp.month());
        if self.current == Some(month) {
            return;
        }
        self.snapshot(capital);
        self.current = Some(month);
        self.month_start_capital = capital;
    }

    /// Closes the open month and returns the series in chronological order.
    pub fn finish(mut self, capital: f64) -> Vec<MonthlyReturn> {
        self.snapshot(capital);
        self.returns
    }

    fn snapshot(&mut self, capital: f64) {
        if let Some((year, month)) = self.current {
            // a month that starts with no capital has no return
            let return_pct = if self.month_start_capital > 0.0 {
                (capital - self.month_start_capital) / self.month_start_capital * 100.0
            } else {
                0.0
            };
            self.returns.push(MonthlyReturn {
                month: format!("{year:04}-{month:02}"),
                return_pct,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    #[test]
    fn test_month_boundaries() {
        let mut tracker = MonthlyTracker::new(100.0);
        tracker.observe(at(2024, 1, 2), 100.0);
        tracker.observe(at(2024, 1, 31), 110.0);
        tracker.observe(at(2024, 2, 1), 110.0);
        let returns = tracker.finish(99.0);

        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].month, "2024-01");
        assert!((returns[0].return_pct - 10.0).abs() < 1e-12);
        assert_eq!(returns[1].month, "2024-02");
        assert!((returns[1].return_pct + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_month_after_wipeout_is_flat() {
        let mut tracker = MonthlyTracker::new(100.0);
        tracker.observe(at(2024, 3, 28), 100.0);
        tracker.observe(at(2024, 4, 1), 0.0);
        let returns = tracker.finish(0.0);

        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].return_pct, -100.0);
        assert_eq!(returns[1].month, "2024-04");
        assert_eq!(returns[1].return_pct, 0.0);
    }

    #[test]
    fn test_no_bars_no_months() {
        assert!(MonthlyTracker::new(100.0).finish(100.0).is_empty());
    }
}
