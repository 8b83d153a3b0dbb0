//! Performance metrics over a completed trade list

use std::collections::BTreeMap;

use statrs::statistics::Statistics;
use tracing::warn;

use crate::config::StrategyConfig;
use crate::simulator::SimulationOutcome;
use crate::types::{BacktestResult, ExitReason, MonthlyReturn, Trade};

/// `gross_profit / |gross_loss|`, losses being trades with `pnl <= 0`.
///
/// Infinite when there are winners and no losses; 0 with no trades or when
/// nothing was gained or lost.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl <= 0.0).map(|t| t.pnl).sum::<f64>().abs();

    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Starting capital followed by capital after each trade
pub fn equity_curve(initial_capital: f64, trades: &[Trade]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    let mut equity = initial_capital;
    curve.push(equity);
    for trade in trades {
        equity += trade.pnl;
        curve.push(equity);
    }
    curve
}

/// Largest peak-to-trough decline of the curve, in percent of the peak
pub fn max_drawdown_pct(curve: &[f64]) -> f64 {
    let mut running_max = f64::MIN;
    let mut worst = 0.0f64;
    for &equity in curve {
        running_max = running_max.max(equity);
        if running_max > 0.0 {
            worst = worst.max((running_max - equity) / running_max * 100.0);
        }
    }
    worst
}

/// Summary of the per-month return series
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonthlyStats {
    pub avg: f64,
    pub std: f64,
    pub profitable_months: usize,
    pub max_profit: f64,
    pub max_loss: f64,
    pub sharpe_ratio: f64,
}

impl MonthlyStats {
    /// Population statistics; sharpe is `avg / std` and 0 when std is 0.
    pub fn from_returns(returns: &[MonthlyReturn]) -> Self {
        if returns.is_empty() {
            return Self::default();
        }
        let values: Vec<f64> = returns.iter().map(|m| m.return_pct).collect();
        let avg = values.iter().mean();
        let std = if values.len() > 1 {
            values.iter().population_std_dev()
        } else {
            0.0
        };
        let sharpe_ratio = if std > 0.0 && std.is_finite() { avg / std } else { 0.0 };

        Self {
            avg,
            std,
            profitable_months: values.iter().filter(|&&v| v > 0.0).count(),
            max_profit: values.iter().copied().fold(f64::MIN, f64::max),
            max_loss: values.iter().copied().fold(f64::MAX, f64::min),
            sharpe_ratio,
        }
    }
}

pub fn exit_reason_counts(trades: &[Trade]) -> BTreeMap<ExitReason, usize> {
    let mut counts = BTreeMap::new();
    for trade in trades {
        *counts.entry(trade.exit_reason).or_insert(0) += 1;
    }
    counts
}

/// Reduces a simulation outcome to the run's result record.
pub fn aggregate(config: &StrategyConfig, outcome: &SimulationOutcome) -> BacktestResult {
    let trades = &outcome.trades;
    let total_trades = trades.len();
    let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();

    if total_trades == 0 {
        warn!(combination = %config.combination(), "no trades executed");
    }

    let ratio = |num: f64| if total_trades > 0 { num / total_trades as f64 } else { 0.0 };
    let monthly = MonthlyStats::from_returns(&outcome.monthly_returns);
    let initial = config.initial_capital;

    BacktestResult {
        ema_short: config.ema_short_period,
        ema_long: config.ema_long_period,
        trading_mode: config.trading_mode,
        pattern_length: config.pattern_length,
        total_trades,
        winning_trades,
        win_rate: ratio(winning_trades as f64),
        profit_factor: profit_factor(trades),
        total_profit: outcome.final_capital - initial,
        final_capital: outcome.final_capital,
        return_pct: (outcome.final_capital - initial) / initial * 100.0,
        max_drawdown_pct: max_drawdown_pct(&equity_curve(initial, trades)),
        monthly_returns_avg: monthly.avg,
        monthly_returns_std: monthly.std,
        profitable_months: monthly.profitable_months,
        max_monthly_profit: monthly.max_profit,
        max_monthly_loss: monthly.max_loss,
        sharpe_ratio: monthly.sharpe_ratio,
        avg_trade_duration_minutes: ratio(trades.iter().map(|t| t.duration_minutes).sum()),
        exit_reasons: exit_reason_counts(trades),
        monthly_returns: outcome.monthly_returns.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::NaiveDate;

    fn trade(pnl: f64, reason: ExitReason) -> Trade {
        let t = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(10, 0, 0).unwrap();
        Trade {
            entry_time: t,
            exit_time: t + chrono::Duration::minutes(30),
            entry_price: 100.0,
            exit_price: 100.0,
            side: Side::Long,
            pnl,
            duration_minutes: 30.0,
            exit_reason: reason,
        }
    }

    fn month(label: &str, pct: f64) -> MonthlyReturn {
        MonthlyReturn {
            month: label.to_string(),
            return_pct: pct,
        }
    }

    #[test]
    fn test_profit_factor_cases() {
        assert_eq!(profit_factor(&[]), 0.0);
        assert!(profit_factor(&[trade(5.0, ExitReason::Signal)]).is_infinite());
        assert_eq!(profit_factor(&[trade(0.0, ExitReason::Signal)]), 0.0);
        let pf = profit_factor(&[
            trade(30.0, ExitReason::Signal),
            trade(-10.0, ExitReason::StopLoss),
            trade(-5.0, ExitReason::ForceExit),
        ]);
        assert!((pf - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_from_equity_curve() {
        let trades = [
            trade(100.0, ExitReason::Signal),
            trade(-220.0, ExitReason::Signal),
            trade(50.0, ExitReason::Signal),
        ];
        let curve = equity_curve(1_000.0, &trades);
        assert_eq!(curve, vec![1_000.0, 1_100.0, 880.0, 930.0]);
        assert!((max_drawdown_pct(&curve) - 20.0).abs() < 1e-9);
        assert_eq!(max_drawdown_pct(&[1_000.0]), 0.0);
    }

    #[test]
    fn test_monthly_stats() {
        let stats = MonthlyStats::from_returns(&[month("2024-01", 2.0), month("2024-02", -1.0), month("2024-03", 2.0)]);
        assert!((stats.avg - 1.0).abs() < 1e-12);
        assert!((stats.std - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.profitable_months, 2);
        assert_eq!(stats.max_profit, 2.0);
        assert_eq!(stats.max_loss, -1.0);
        assert!((stats.sharpe_ratio - 1.0 / 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_flat_months_have_zero_sharpe() {
        let single = MonthlyStats::from_returns(&[month("2024-01", 3.0)]);
        assert_eq!(single.std, 0.0);
        assert_eq!(single.sharpe_ratio, 0.0);

        let flat = MonthlyStats::from_returns(&[month("2024-01", 0.0), month("2024-02", 0.0)]);
        assert_eq!(flat.sharpe_ratio, 0.0);
        assert_eq!(MonthlyStats::from_returns(&[]), MonthlyStats::default());
    }

    #[test]
    fn test_exit_reason_histogram() {
        let counts = exit_reason_counts(&[
            trade(1.0, ExitReason::Signal),
            trade(-1.0, ExitReason::StopLoss),
            trade(1.0, ExitReason::Signal),
        ]);
        assert_eq!(counts.get(&ExitReason::Signal), Some(&2));
        assert_eq!(counts.get(&ExitReason::StopLoss), Some(&1));
        assert_eq!(counts.get(&ExitReason::ForceExit), None);
    }
}
