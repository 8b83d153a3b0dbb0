//! Determinism tests for the backtesting engine
//!
//! Repeated runs, sequential against parallel sweeps, and property checks
//! over random price walks.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use ema_ha_backtest::config::{ExecutionMode, Settings};
use ema_ha_backtest::data::MarketSeries;
use ema_ha_backtest::signals::derive_bars;
use ema_ha_backtest::simulator::simulate;
use ema_ha_backtest::sweep::{cross_validate, run_sweep, SweepOptions};
use ema_ha_backtest::synthetic::{generate_seeded, SyntheticSpec};
use ema_ha_backtest::versioning::results_fingerprint;
use ema_ha_backtest::{run_backtest, Combination, MarketBar, RiskSettings, SessionTimes, StrategyConfig, TradingMode};

fn synthetic_series(seed: u64) -> Result<MarketSeries> {
    let spec = SyntheticSpec {
        days: 7,
        interval_minutes: 1,
        volatility: 0.002,
        ..SyntheticSpec::default()
    };
    Ok(MarketSeries::from_bars(generate_seeded(&spec, seed)?)?)
}

fn sweep_settings() -> Settings {
    let mut settings = Settings::default();
    settings.strategy.ema_pairs = vec![[5, 13], [9, 21]];
    settings.risk_management.use_stop_loss = true;
    settings.risk_management.use_trailing_stop = true;
    settings
}

#[test]
fn test_repeated_runs_are_identical() -> Result<()> {
    let series = synthetic_series(7)?;
    let config = sweep_settings().strategy_config(Combination::new(5, 13, TradingMode::Swing, None))?;

    let first = run_backtest(&config, &series.bars)?;
    for _ in 0..3 {
        assert_eq!(run_backtest(&config, &series.bars)?, first);
    }
    Ok(())
}

#[test]
fn test_sequential_and_parallel_sweeps_agree() -> Result<()> {
    let series = synthetic_series(42)?;
    let settings = sweep_settings();
    let options = SweepOptions::from_settings(&settings);

    let report = cross_validate(&settings, &series.bars, &options)?;
    assert_eq!(report.combinations, 2 * 3 * 3);
    assert!(report.passed(), "{:?}", report.mismatches);

    let limited = SweepOptions {
        max_workers: Some(2),
        ..options.clone()
    };
    let two_workers = run_sweep(&settings, &series.bars, &limited)?;
    let sequential = run_sweep(&settings, &series.bars, &options.with_mode(ExecutionMode::Sequential))?;
    assert_eq!(two_workers, sequential);
    assert_eq!(results_fingerprint(&two_workers)?, report.sequential_hash);
    Ok(())
}

#[test]
fn test_sweep_outcomes_follow_combination_order() -> Result<()> {
    let series = synthetic_series(3)?;
    let mut settings = sweep_settings();
    // 21/9 is invalid and must fail on its own
    settings.strategy.ema_pairs = vec![[21, 9], [5, 13]];
    let outcomes = run_sweep(&settings, &series.bars, &SweepOptions::from_settings(&settings))?;

    let combinations: Vec<Combination> = outcomes.iter().map(|o| o.combination).collect();
    let mut sorted = combinations.clone();
    sorted.sort();
    assert_eq!(combinations, sorted);

    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_ok()).collect();
    assert_eq!(failed.len(), 9);
    assert!(failed.iter().all(|o| o.combination.ema_short == 21));
    assert!(failed[0].error.as_deref().unwrap_or("").starts_with("configuration error"));
    Ok(())
}

#[test]
fn test_same_seed_same_synthetic_data() -> Result<()> {
    assert_eq!(synthetic_series(11)?, synthetic_series(11)?);
    assert_ne!(synthetic_series(11)?.bars, synthetic_series(12)?.bars);
    Ok(())
}

/// One trading day of one-minute bars from a list of per-bar returns
fn walk(returns: &[f64]) -> Vec<MarketBar> {
    let start = NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    let mut close = 1_000.0;
    returns
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let open = close;
            close *= 1.0 + r;
            MarketBar {
                timestamp: start + Duration::minutes(i as i64),
                open,
                high: open.max(close) * 1.0005,
                low: open.min(close) * 0.9995,
                close,
                volume: None,
            }
        })
        .collect()
}

fn walk_config(mode: TradingMode, stops: bool) -> StrategyConfig {
    let risk = RiskSettings {
        use_stop_loss: stops,
        use_trailing_stop: stops,
        ..RiskSettings::default()
    };
    StrategyConfig::new(Combination::new(3, 8, mode, None), SessionTimes::default(), risk, 25_000.0)
        .unwrap()
}

fn mode_strategy() -> impl Strategy<Value = TradingMode> {
    prop_oneof![Just(TradingMode::Buy), Just(TradingMode::Sell), Just(TradingMode::Swing)]
}

proptest! {
    #[test]
    fn prop_metrics_stay_in_range(
        returns in prop::collection::vec(-0.01f64..0.01, 20..375),
        mode in mode_strategy(),
        stops in any::<bool>(),
    ) {
        let bars = walk(&returns);
        let (result, trades) = run_backtest(&walk_config(mode, stops), &bars).unwrap();

        prop_assert!((0.0..=100.0).contains(&result.max_drawdown_pct));
        prop_assert!((0.0..=1.0).contains(&result.win_rate));
        prop_assert!(result.profit_factor >= 0.0);
        prop_assert_eq!(result.total_trades, trades.len());
        prop_assert_eq!(result.exit_reasons.values().sum::<usize>(), trades.len());
        prop_assert!((result.total_profit - trades.iter().map(|t| t.pnl).sum::<f64>()).abs() < 1e-6);
        if mode == TradingMode::Buy {
            prop_assert!(trades.iter().all(|t| t.side == ema_ha_backtest::Side::Long));
        }
        if mode == TradingMode::Sell {
            prop_assert!(trades.iter().all(|t| t.side == ema_ha_backtest::Side::Short));
        }
    }

    #[test]
    fn prop_every_closed_entry_is_one_trade(
        returns in prop::collection::vec(-0.01f64..0.01, 20..375),
        stops in any::<bool>(),
    ) {
        let config = walk_config(TradingMode::Swing, stops);
        let derived = derive_bars(&config, &walk(&returns)).unwrap();
        let outcome = simulate(&config, &derived).unwrap();

        let still_open = usize::from(outcome.open_position.is_some());
        prop_assert_eq!(outcome.trades.len(), outcome.entries - still_open);
        for pair in outcome.trades.windows(2) {
            prop_assert!(pair[0].exit_time <= pair[1].entry_time);
        }
    }

    #[test]
    fn prop_drawdown_bounded_when_shorts_blow_up(
        returns in prop::collection::vec(-0.02f64..0.25, 20..200),
        mode in mode_strategy(),
    ) {
        let config = walk_config(mode, false).with_reverse_on_signal_exit(true);
        let derived = derive_bars(&config, &walk(&returns)).unwrap();
        let outcome = simulate(&config, &derived).unwrap();
        prop_assert!(outcome.final_capital >= 0.0);

        let (result, trades) = run_backtest(&config, &walk(&returns)).unwrap();
        prop_assert!((0.0..=100.0).contains(&result.max_drawdown_pct));
        prop_assert!(result.monthly_returns_avg.is_finite());
        prop_assert!(trades.iter().all(|t| t.pnl.is_finite()));
    }

    #[test]
    fn prop_runs_are_deterministic(returns in prop::collection::vec(-0.02f64..0.02, 20..200)) {
        let bars = walk(&returns);
        let config = walk_config(TradingMode::Swing, true);
        prop_assert_eq!(run_backtest(&config, &bars).unwrap(), run_backtest(&config, &bars).unwrap());
    }
}
