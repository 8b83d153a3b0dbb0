use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ema_ha_backtest::config::{ExecutionMode, Settings};
use ema_ha_backtest::indicators::{ema_series, heikin_ashi};
use ema_ha_backtest::sweep::{run_sweep, SweepOptions};
use ema_ha_backtest::synthetic::{generate_seeded, SyntheticSpec};
use ema_ha_backtest::{run_backtest, Combination, MarketBar, TradingMode};

fn series(days: u32) -> Vec<MarketBar> {
    let spec = SyntheticSpec {
        days,
        ..SyntheticSpec::default()
    };
    generate_seeded(&spec, 42).expect("synthetic series")
}

fn bench_indicators(c: &mut Criterion) {
    let bars = series(30);
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    c.bench_function("heikin_ashi", |b| b.iter(|| heikin_ashi(black_box(&bars))));
    c.bench_function("ema_series_21", |b| b.iter(|| ema_series(black_box(&closes), 21)));
}

fn bench_backtest(c: &mut Criterion) {
    let settings = Settings::default();
    let mut group = c.benchmark_group("run_backtest");
    for days in [10u32, 30, 90] {
        let bars = series(days);
        let config = settings
            .strategy_config(Combination::new(9, 21, TradingMode::Swing, None))
            .expect("valid combination");
        group.bench_with_input(BenchmarkId::from_parameter(bars.len()), &bars, |b, bars| {
            b.iter(|| run_backtest(&config, black_box(bars)))
        });
    }
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let settings = Settings::default();
    let bars = series(30);
    let mut group = c.benchmark_group("sweep");
    group.sample_size(10);
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let options = SweepOptions::from_settings(&settings).with_mode(mode);
        group.bench_function(format!("{mode:?}"), |b| {
            b.iter(|| run_sweep(&settings, black_box(&bars), &options))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_indicators, bench_backtest, bench_sweep);
criterion_main!(benches);
