//! Parameter sweep over EMA pairs, trading modes and pattern lengths
//!
//! Every combination is an isolated call to [`run_backtest`] over the same
//! read-only series. Runs share no mutable state, so the parallel path is a
//! plain rayon map; outcomes are re-sorted by combination before anything
//! order-sensitive looks at them.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::config::{Combination, ExecutionMode, Settings};
use crate::error::{BacktestError, Result};
use crate::run_backtest;
use crate::types::{BacktestResult, MarketBar, Trade};
use crate::versioning::results_fingerprint;

/// How a sweep is scheduled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOptions {
    pub mode: ExecutionMode,
    /// Worker threads for the parallel path; rayon's default when unset
    pub max_workers: Option<usize>,
    pub base_seed: u64,
    /// Keep each combination's trade list on its outcome
    pub collect_trades: bool,
}

impl SweepOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.execution.mode,
            max_workers: settings.execution.max_workers,
            base_seed: settings.execution.seed,
            collect_trades: false,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_trades(mut self, collect: bool) -> Self {
        self.collect_trades = collect;
        self
    }
}

/// Result of one sweep cell: either a result or the error that stopped it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationOutcome {
    #[serde(flatten)]
    pub combination: Combination,
    pub seed: u64,
    pub result: Option<BacktestResult>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trades: Option<Vec<Trade>>,
}

impl CombinationOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_some()
    }
}

/// Stable per-combination seed: the first eight bytes of
/// `sha256("{key}:{base_seed}")`. Identical across processes and platforms.
pub fn combination_seed(combination: &Combination, base_seed: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", combination.key(), base_seed).as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn run_combination(
    settings: &Settings,
    combination: Combination,
    bars: &[MarketBar],
    options: &SweepOptions,
) -> CombinationOutcome {
    let seed = combination_seed(&combination, options.base_seed);
    let run = settings
        .strategy_config(combination)
        .and_then(|config| run_backtest(&config, bars));

    match run {
        Ok((result, trades)) => CombinationOutcome {
            combination,
            seed,
            result: Some(result),
            error: None,
            trades: options.collect_trades.then_some(trades),
        },
        Err(e) => {
            error!(combination = %combination, kind = ?e.kind(), "combination failed: {e}");
            CombinationOutcome {
                combination,
                seed,
                result: None,
                error: Some(e.to_string()),
                trades: None,
            }
        }
    }
}

/// Runs every combination in `settings`. Individual failures are recorded
/// on their outcome; only an unusable settings document or thread pool
/// fails the sweep itself. Outcomes come back sorted by combination.
pub fn run_sweep(
    settings: &Settings,
    bars: &[MarketBar],
    options: &SweepOptions,
) -> Result<Vec<CombinationOutcome>> {
    let combinations = settings.combinations()?;
    info!(
        combinations = combinations.len(),
        bars = bars.len(),
        mode = ?options.mode,
        "starting sweep"
    );

    let mut outcomes: Vec<CombinationOutcome> = match options.mode {
        ExecutionMode::Sequential => combinations
            .iter()
            .map(|&c| run_combination(settings, c, bars, options))
            .collect(),
        ExecutionMode::Parallel => {
            let mut builder = rayon::ThreadPoolBuilder::new();
            if let Some(workers) = options.max_workers {
                builder = builder.num_threads(workers);
            }
            let pool = builder
                .build()
                .map_err(|e| BacktestError::config(format!("cannot build worker pool: {e}")))?;
            pool.install(|| {
                combinations
                    .par_iter()
                    .map(|&c| run_combination(settings, c, bars, options))
                    .collect()
            })
        }
    };

    outcomes.sort_by_key(|o| o.combination);

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        warn!(failed, total = outcomes.len(), "some combinations failed");
    }
    info!(completed = outcomes.len() - failed, failed, "sweep finished");
    Ok(outcomes)
}

/// One field that differs between the sequential and parallel runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub combination: Option<Combination>,
    pub field: String,
    pub sequential: String,
    pub parallel: String,
}

/// Outcome of comparing a sequential sweep with a parallel one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub combinations: usize,
    pub sequential_hash: String,
    pub parallel_hash: String,
    pub mismatches: Vec<Mismatch>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.sequential_hash == self.parallel_hash
    }
}

fn compare_outcomes(seq: &CombinationOutcome, par: &CombinationOutcome, mismatches: &mut Vec<Mismatch>) -> Result<()> {
    let to_value = |o: &CombinationOutcome| {
        serde_json::to_value(o).map_err(|e| BacktestError::Parse(e.to_string()))
    };
    let (seq_value, par_value) = (to_value(seq)?, to_value(par)?);
    let (Some(seq_map), Some(par_map)) = (seq_value.as_object(), par_value.as_object()) else {
        return Ok(());
    };

    let mut push = |field: String, a: Option<&serde_json::Value>, b: Option<&serde_json::Value>| {
        let show = |v: Option<&serde_json::Value>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        mismatches.push(Mismatch {
            combination: Some(seq.combination),
            field,
            sequential: show(a),
            parallel: show(b),
        });
    };

    for (key, a) in seq_map {
        let b = par_map.get(key);
        match (key.as_str(), a.as_object(), b.and_then(|b| b.as_object())) {
            // expand nested result records so the report names the metric
            ("result", Some(a_fields), Some(b_fields)) => {
                for (field, av) in a_fields {
                    let bv = b_fields.get(field);
                    if bv != Some(av) {
                        push(format!("result.{field}"), Some(av), bv);
                    }
                }
            }
            _ => {
                if b != Some(a) {
                    push(key.clone(), Some(a), b);
                }
            }
        }
    }
    Ok(())
}

/// Runs the sweep sequentially and in parallel and compares both,
/// field for field and by result fingerprint.
pub fn cross_validate(settings: &Settings, bars: &[MarketBar], options: &SweepOptions) -> Result<ValidationReport> {
    let base = options.clone().with_trades(false);
    let sequential = run_sweep(settings, bars, &base.clone().with_mode(ExecutionMode::Sequential))?;
    let parallel = run_sweep(settings, bars, &base.with_mode(ExecutionMode::Parallel))?;

    let mut mismatches = Vec::new();
    if sequential.len() != parallel.len() {
        mismatches.push(Mismatch {
            combination: None,
            field: "combinations".to_string(),
            sequential: sequential.len().to_string(),
            parallel: parallel.len().to_string(),
        });
    }
    for (seq, par) in sequential.iter().zip(&parallel) {
        compare_outcomes(seq, par, &mut mismatches)?;
    }

    let report = ValidationReport {
        combinations: sequential.len(),
        sequential_hash: results_fingerprint(&sequential)?,
        parallel_hash: results_fingerprint(&parallel)?,
        mismatches,
    };

    if report.passed() {
        info!(combinations = report.combinations, hash = %report.sequential_hash, "cross-validation passed");
    } else {
        error!(mismatches = report.mismatches.len(), "cross-validation found differences");
    }
    Ok(report)
}
