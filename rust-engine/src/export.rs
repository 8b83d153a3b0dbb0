//! Result persistence
//!
//! Writes one JSON document with every combination's result, the series
//! metadata and the run manifest; a CSV summary with one row per
//! combination; and one trades CSV per combination that kept its trades.
//! File names carry no wall-clock stamp, so reruns overwrite in place.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Combination;
use crate::data::SeriesMetadata;
use crate::precision::PrecisionConfig;
use crate::sweep::CombinationOutcome;
use crate::types::{pattern_label, Trade};
use crate::versioning::RunManifest;

/// Everything persisted for one sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub symbol: String,
    pub timeframe: String,
    pub backtest_period: SeriesMetadata,
    pub manifest: RunManifest,
    pub results: Vec<CombinationOutcome>,
}

/// Export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub precision: PrecisionConfig,
}

impl ExportConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            precision: PrecisionConfig::default(),
        }
    }
}

/// Paths written by [`ResultsExporter::export`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportedFiles {
    pub results_json: PathBuf,
    pub summary_csv: PathBuf,
    pub trades_csv: Vec<PathBuf>,
}

/// `{symbol}_EMA_{short}_{long}_{mode}_{pattern}_trades.csv`
pub fn trades_filename(symbol: &str, combination: &Combination) -> String {
    format!(
        "{}_EMA_{}_{}_{}_{}_trades.csv",
        symbol,
        combination.ema_short,
        combination.ema_long,
        combination.trading_mode,
        pattern_label(combination.pattern_length)
    )
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

const SUMMARY_HEADER: &str = "ema_short,ema_long,trading_mode,pattern_length,total_trades,winning_trades,\
win_rate,profit_factor,total_profit,final_capital,return_pct,max_drawdown_pct,monthly_returns_avg,\
monthly_returns_std,profitable_months,max_monthly_profit,max_monthly_loss,sharpe_ratio,\
avg_trade_duration_minutes,error";

/// One row per combination. Failed combinations keep their identity
/// columns and the error text; metric cells are left empty.
pub fn summary_csv(outcomes: &[CombinationOutcome], precision: &PrecisionConfig) -> String {
    let mut out = String::from(SUMMARY_HEADER);
    out.push('\n');
    for outcome in outcomes {
        let c = &outcome.combination;
        out.push_str(&format!(
            "{},{},{},{},",
            c.ema_short,
            c.ema_long,
            c.trading_mode,
            pattern_label(c.pattern_length)
        ));
        match &outcome.result {
            Some(r) => {
                out.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},",
                    r.total_trades,
                    r.winning_trades,
                    precision.ratio(r.win_rate),
                    precision.ratio(r.profit_factor),
                    precision.money(r.total_profit),
                    precision.money(r.final_capital),
                    precision.pct(r.return_pct),
                    precision.pct(r.max_drawdown_pct),
                    precision.pct(r.monthly_returns_avg),
                    precision.pct(r.monthly_returns_std),
                    r.profitable_months,
                    precision.pct(r.max_monthly_profit),
                    precision.pct(r.max_monthly_loss),
                    precision.ratio(r.sharpe_ratio),
                    precision.ratio(r.avg_trade_duration_minutes),
                ));
            }
            None => out.push_str(",,,,,,,,,,,,,,,"),
        }
        out.push_str(&csv_field(outcome.error.as_deref().unwrap_or("")));
        out.push('\n');
    }
    out
}

pub fn trades_csv(trades: &[Trade], precision: &PrecisionConfig) -> String {
    let mut out = String::from("entry_time,exit_time,entry_price,exit_price,position_type,pnl,duration,exit_reason\n");
    for t in trades {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            t.entry_time.format("%Y-%m-%d %H:%M:%S"),
            t.exit_time.format("%Y-%m-%d %H:%M:%S"),
            precision.price(t.entry_price),
            precision.price(t.exit_price),
            t.side,
            precision.money(t.pnl),
            precision.ratio(t.duration_minutes),
            t.exit_reason,
        ));
    }
    out
}

/// Results exporter
pub struct ResultsExporter {
    config: ExportConfig,
}

impl ResultsExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn export(&self, document: &ResultsDocument) -> Result<ExportedFiles> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let stem = format!("{}_{}", document.symbol, document.timeframe);

        let results_json = dir.join(format!("{stem}_results.json"));
        let json = serde_json::to_string_pretty(document).context("serializing results")?;
        write(&results_json, &json)?;

        let summary_path = dir.join(format!("{stem}_summary.csv"));
        write(&summary_path, &summary_csv(&document.results, &self.config.precision))?;

        let mut trades_paths = Vec::new();
        for outcome in &document.results {
            if let Some(trades) = &outcome.trades {
                let path = dir.join(trades_filename(&document.symbol, &outcome.combination));
                write(&path, &trades_csv(trades, &self.config.precision))?;
                debug!(path = %path.display(), trades = trades.len(), "wrote trades");
                trades_paths.push(path);
            }
        }

        info!(
            results = %results_json.display(),
            summary = %summary_path.display(),
            trade_files = trades_paths.len(),
            "results saved"
        );
        Ok(ExportedFiles {
            results_json,
            summary_csv: summary_path,
            trades_csv: trades_paths,
        })
    }
}

fn write(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

/// Reads back a document written by [`ResultsExporter::export`].
pub fn load_results(path: impl AsRef<Path>) -> Result<ResultsDocument> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::data::MarketSeries;
    use crate::sweep::{run_sweep, SweepOptions};
    use crate::synthetic::{generate_seeded, SyntheticSpec};
    use crate::types::{PatternLength, TradingMode};
    use crate::ExecutionMode;

    #[test]
    fn test_trades_filename() {
        let combo = Combination::new(9, 21, TradingMode::Swing, Some(PatternLength::Two));
        assert_eq!(trades_filename("NIFTY", &combo), "NIFTY_EMA_9_21_SWING_2_trades.csv");
        let combo = Combination::new(13, 34, TradingMode::Buy, None);
        assert_eq!(trades_filename("NIFTY", &combo), "NIFTY_EMA_13_34_BUY_None_trades.csv");
    }

    #[test]
    fn test_trades_csv_rows() {
        let t = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 45, 0)
            .unwrap();
        let trade = Trade {
            entry_time: t,
            exit_time: t + chrono::Duration::minutes(90),
            entry_price: 100.0,
            exit_price: 101.005,
            side: crate::types::Side::Short,
            pnl: -25.125,
            duration_minutes: 90.0,
            exit_reason: crate::types::ExitReason::TrailingStop,
        };
        let csv = trades_csv(&[trade.clone(), trade], &PrecisionConfig::default());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "2024-01-02 09:45:00,2024-01-02 11:15:00,100.00,101.00,SHORT,-25.12,90.0000,TrailingStop"
        );
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn test_summary_row_for_failure() {
        let outcome = CombinationOutcome {
            combination: Combination::new(21, 9, TradingMode::Sell, None),
            seed: 3,
            result: None,
            error: Some("configuration error: short, long".to_string()),
            trades: None,
        };
        let csv = summary_csv(&[outcome], &PrecisionConfig::default());
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("21,9,SELL,None,"));
        assert!(row.ends_with("\"configuration error: short, long\""));
        assert_eq!(
            csv.lines().next().unwrap().split(',').count(),
            row.trim_end_matches("\"configuration error: short, long\"").split(',').count()
        );
    }

    #[test]
    fn test_export_and_reload() {
        let spec = SyntheticSpec {
            days: 10,
            interval_minutes: 5,
            ..SyntheticSpec::default()
        };
        let series = MarketSeries::from_bars(generate_seeded(&spec, 11).unwrap()).unwrap();
        let mut settings = Settings::default();
        settings.strategy.ema_pairs = vec![[5, 13]];
        settings.override_pattern(None);
        let options = SweepOptions::from_settings(&settings)
            .with_mode(ExecutionMode::Sequential)
            .with_trades(true);
        let outcomes = run_sweep(&settings, &series.bars, &options).unwrap();
        let manifest =
            RunManifest::create(&settings, &series.bars, series.metadata.clone(), &outcomes, 0).unwrap();

        let document = ResultsDocument {
            symbol: settings.data.symbol.clone(),
            timeframe: settings.data.timeframe.clone(),
            backtest_period: series.metadata.clone(),
            manifest,
            results: outcomes,
        };

        let dir = std::env::temp_dir().join(format!("ema-ha-export-{}", std::process::id()));
        let files = ResultsExporter::new(ExportConfig::new(&dir)).export(&document).unwrap();
        assert_eq!(files.trades_csv.len(), 3);
        assert!(files.summary_csv.exists());

        let reloaded = load_results(&files.results_json).unwrap();
        assert_eq!(reloaded.results.len(), document.results.len());
        for (a, b) in reloaded.results.iter().zip(&document.results) {
            assert_eq!(a.combination, b.combination);
            let (ra, rb) = (a.result.as_ref().unwrap(), b.result.as_ref().unwrap());
            assert_eq!(ra.total_trades, rb.total_trades);
            assert_eq!(ra.has_infinite_profit_factor(), rb.has_infinite_profit_factor());
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
