//! Error types for MixTune
//!
//! Provides a unified error type and domain-specific error variants

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using MixtuneError
pub type Result<T> = std::result::Result<T, MixtuneError>;

/// Unified error type for MixTune operations
#[derive(Debug, Error)]
pub enum MixtuneError {
    // Session ledger errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // Sampling and fitting errors
    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    // Persistence layer errors
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // Request validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Session ledger errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("number of nodes for session {session_id} is {stored}, request declared {declared}")]
    DimensionMismatch {
        session_id: String,
        stored: usize,
        declared: usize,
    },

    #[error("ledger for session {session_id} is unreadable ({reason}), consider deleting it")]
    CorruptLedger { session_id: String, reason: String },
}

/// Errors raised while sampling or fitting on the simplex
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("no sample out of {batch_size} x {batches} satisfied the max weight constraint")]
    EmptyAcceptanceSet { batch_size: usize, batches: usize },

    #[error("dirichlet fit did not converge: {0}")]
    FitDivergence(String),

    #[error("invalid concentration parameters: {0}")]
    InvalidConcentration(String),

    #[error("bound has {bound} entries but concentration has {concentration}")]
    BoundLength { bound: usize, concentration: usize },
}

/// Stable, machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DimensionMismatch,
    CorruptLedger,
    EmptyAcceptanceSet,
    FitDivergence,
    StoreUnavailable,
    InvalidInput,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::CorruptLedger => "corrupt_ledger",
            ErrorKind::EmptyAcceptanceSet => "empty_acceptance_set",
            ErrorKind::FitDivergence => "fit_divergence",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            SessionError::CorruptLedger { .. } => ErrorKind::CorruptLedger,
        }
    }
}

impl SamplingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SamplingError::EmptyAcceptanceSet { .. } => ErrorKind::EmptyAcceptanceSet,
            SamplingError::FitDivergence(_) => ErrorKind::FitDivergence,
            SamplingError::InvalidConcentration(_) | SamplingError::BoundLength { .. } => {
                ErrorKind::InvalidInput
            }
        }
    }

    /// Whether the proposal policy may recover from this error by exploring
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SamplingError::EmptyAcceptanceSet { .. } | SamplingError::FitDivergence(_)
        )
    }
}

impl MixtuneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MixtuneError::Session(e) => e.kind(),
            MixtuneError::Sampling(e) => e.kind(),
            MixtuneError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            MixtuneError::InvalidInput(_) => ErrorKind::InvalidInput,
            MixtuneError::Config(_) => ErrorKind::Config,
            MixtuneError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for MixtuneError {
    fn from(err: anyhow::Error) -> Self {
        MixtuneError::Internal(err.to_string())
    }
}
