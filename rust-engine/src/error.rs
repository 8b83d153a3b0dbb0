//! Error taxonomy for the backtesting engine

use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors raised by the engine. Every variant is fatal for the run that
/// produced it; sweeps record the message and move on to the next combination.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Invalid strategy parameters or settings. Raised before a run starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unusable input series (empty, non-finite prices, duplicates).
    #[error("data error: {0}")]
    Data(String),

    /// Bar timestamps went backwards or repeated mid-run.
    #[error("data error: timestamp at bar {index} ({current}) does not follow {previous}")]
    NonMonotonic {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    /// Arithmetic failure while processing a bar.
    #[error("computation error at bar {index} ({timestamp}): {message}")]
    Computation {
        index: usize,
        timestamp: NaiveDateTime,
        message: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Coarse classification used by the orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Computation,
}

impl BacktestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BacktestError::Configuration(_) | BacktestError::Parse(_) => ErrorKind::Configuration,
            BacktestError::Data(_) | BacktestError::NonMonotonic { .. } | BacktestError::Io(_) => {
                ErrorKind::Data
            }
            BacktestError::Computation { .. } => ErrorKind::Computation,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        BacktestError::Configuration(message.into())
    }

    pub(crate) fn data(message: impl Into<String>) -> Self {
        BacktestError::Data(message.into())
    }
}

pub type Result<T> = std::result::Result<T, BacktestError>;
