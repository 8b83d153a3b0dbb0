//! Run manifests for reproducible sweeps
//!
//! A manifest records the engine version, the input series and SHA-256
//! hashes of the settings, the bars and the sorted results, so a later run
//! can prove it reproduced the same numbers.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::Settings;
use crate::data::SeriesMetadata;
use crate::error::{BacktestError, Result};
use crate::sweep::CombinationOutcome;
use crate::types::MarketBar;

/// Hex SHA-256 of a value's compact JSON encoding
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let serialized = serde_json::to_string(value).map_err(|e| BacktestError::Parse(e.to_string()))?;
    Ok(calculate_hash(&serialized))
}

fn calculate_hash(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash of the per-combination results and errors, ignoring trade lists
pub fn results_fingerprint(outcomes: &[CombinationOutcome]) -> Result<String> {
    let view: Vec<_> = outcomes
        .iter()
        .map(|o| (&o.combination, &o.result, &o.error))
        .collect();
    fingerprint(&view)
}

/// Engine version information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub name: String,
    pub version: String,
}

impl EngineVersion {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub combinations: usize,
    pub failed: usize,
    pub total_trades: usize,
}

impl ResultSummary {
    fn from_outcomes(outcomes: &[CombinationOutcome]) -> Self {
        Self {
            combinations: outcomes.len(),
            failed: outcomes.iter().filter(|o| !o.is_ok()).count(),
            total_trades: outcomes
                .iter()
                .filter_map(|o| o.result.as_ref())
                .map(|r| r.total_trades)
                .sum(),
        }
    }
}

/// Audit chain for verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChain {
    pub settings_hash: String,
    pub data_hash: String,
    pub result_hash: String,
    /// Hash over the three hashes above
    pub verification_hash: String,
}

impl AuditChain {
    fn build(settings: &Settings, bars: &[MarketBar], outcomes: &[CombinationOutcome]) -> Result<Self> {
        let settings_hash = fingerprint(settings)?;
        let data_hash = fingerprint(bars)?;
        let result_hash = results_fingerprint(outcomes)?;
        let verification_hash = calculate_hash(&format!("{settings_hash}{data_hash}{result_hash}"));
        Ok(Self {
            settings_hash,
            data_hash,
            result_hash,
            verification_hash,
        })
    }
}

/// Run manifest for reproducibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Derived from the settings and data hashes
    pub run_id: String,
    pub engine_version: EngineVersion,
    pub symbol: String,
    pub timeframe: String,
    pub data_info: SeriesMetadata,
    pub created_at: DateTime<Utc>,
    pub execution_duration_ms: u64,
    pub result_summary: ResultSummary,
    pub audit_chain: AuditChain,
}

/// Outcome of re-checking a manifest against a fresh run
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub valid: bool,
    pub issues: Vec<String>,
    pub run_id: String,
}

impl RunManifest {
    pub fn create(
        settings: &Settings,
        bars: &[MarketBar],
        data_info: SeriesMetadata,
        outcomes: &[CombinationOutcome],
        execution_duration_ms: u64,
    ) -> Result<Self> {
        let audit_chain = AuditChain::build(settings, bars, outcomes)?;
        let run_id = format!(
            "run-{}",
            &calculate_hash(&format!("{}{}", audit_chain.settings_hash, audit_chain.data_hash))[..12]
        );

        let manifest = Self {
            run_id,
            engine_version: EngineVersion::current(),
            symbol: settings.data.symbol.clone(),
            timeframe: settings.data.timeframe.clone(),
            data_info,
            created_at: Utc::now(),
            execution_duration_ms,
            result_summary: ResultSummary::from_outcomes(outcomes),
            audit_chain,
        };
        info!(run_id = %manifest.run_id, result_hash = %manifest.audit_chain.result_hash, "created run manifest");
        Ok(manifest)
    }

    /// Compares the recorded hashes with ones recomputed from the given inputs and results.
    pub fn verify(
        &self,
        settings: &Settings,
        bars: &[MarketBar],
        outcomes: &[CombinationOutcome],
    ) -> Result<VerificationResult> {
        let recomputed = AuditChain::build(settings, bars, outcomes)?;
        let mut issues = Vec::new();

        if recomputed.settings_hash != self.audit_chain.settings_hash {
            issues.push("Settings hash mismatch".to_string());
        }
        if recomputed.data_hash != self.audit_chain.data_hash {
            issues.push("Data hash mismatch".to_string());
        }
        if recomputed.result_hash != self.audit_chain.result_hash {
            issues.push("Result hash mismatch".to_string());
        }
        if recomputed.verification_hash != self.audit_chain.verification_hash && issues.is_empty() {
            issues.push("Verification hash mismatch".to_string());
        }
        if self.engine_version != EngineVersion::current() {
            warn!(
                recorded = %self.engine_version.version,
                current = env!("CARGO_PKG_VERSION"),
                "manifest written by a different engine version"
            );
        }

        Ok(VerificationResult {
            valid: issues.is_empty(),
            issues,
            run_id: self.run_id.clone(),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| BacktestError::Parse(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| BacktestError::Parse(e.to_string()))
    }
}
