//! Sweep Demo
//!
//! Generates two weeks of seeded one-minute bars, sweeps two EMA pairs over
//! every mode and pattern setting, and prints the console report.

use anyhow::Result;
use tracing::info;

use ema_ha_backtest::config::Settings;
use ema_ha_backtest::data::MarketSeries;
use ema_ha_backtest::summary::render_report;
use ema_ha_backtest::sweep::{run_sweep, SweepOptions};
use ema_ha_backtest::synthetic::{generate_seeded, SyntheticSpec};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let spec = SyntheticSpec {
        days: 14,
        volatility: 0.0015,
        ..SyntheticSpec::default()
    };
    let series = MarketSeries::from_bars(generate_seeded(&spec, 7)?)?;
    info!(
        candles = series.metadata.total_candles,
        days = series.metadata.total_days,
        "generated demo series"
    );

    let mut settings = Settings::default();
    settings.strategy.ema_pairs = vec![[5, 13], [9, 21]];
    settings.risk_management.use_stop_loss = true;

    let outcomes = run_sweep(&settings, &series.bars, &SweepOptions::from_settings(&settings))?;
    println!("{}", render_report(&outcomes));
    Ok(())
}
