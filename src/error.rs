//! Error types for the valuation engine

use thiserror::Error;

use crate::model::ExportStatus;

/// Errors raised by the numeric kernel, the valuation aggregate, the
/// multiples analyzer and the export ledger.
#[derive(Debug, Error)]
pub enum ValuationError {
    /// Discount rate is zero or negative
    #[error("Invalid discount rate: {0} (must be > 0)")]
    InvalidRate(String),

    /// Gordon growth requires discount rate > growth rate
    #[error("Invalid growth rate: discount rate {rate} must exceed growth rate {growth}")]
    InvalidGrowth { rate: String, growth: String },

    /// Monte Carlo iteration count out of range
    #[error("Invalid iterations: {0}")]
    InvalidIterations(String),

    /// Exit-multiple terminal method without a multiple
    #[error("Exit multiple terminal method requires terminal_ebitda_multiple")]
    MissingExitMultiple,

    #[error("Valuation not found: {0}")]
    ValuationNotFound(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Export log not found: {0}")]
    ExportLogNotFound(String),

    /// Child entity or document reference crosses a tenant or deal boundary
    #[error("Cross-tenant violation: {0}")]
    CrossTenantViolation(String),

    /// An update would break an aggregate invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Export state machine guard
    #[error("Illegal export transition: {from} -> {to}")]
    IllegalTransition { from: ExportStatus, to: ExportStatus },

    /// External report renderer failed
    #[error("Export render failed: {0}")]
    ExportRenderError(String),

    /// Persistence or object-store failure; retry policy belongs to the caller
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed CSV or JSON input at the import boundary
    #[error("Import failed: {0}")]
    ImportError(String),

    /// Decimal range exhausted during a calculation
    #[error("Numeric overflow in {0}")]
    NumericOverflow(String),
}

impl ValuationError {
    /// Lookup misses after the tenant filter; the API layer maps these to 404
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ValuationError::ValuationNotFound(_)
                | ValuationError::ScenarioNotFound(_)
                | ValuationError::DocumentNotFound(_)
                | ValuationError::ExportLogNotFound(_)
        )
    }

    /// Only storage failures are worth a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, ValuationError::StorageError(_))
    }
}

impl From<csv::Error> for ValuationError {
    fn from(err: csv::Error) -> Self {
        ValuationError::ImportError(format!("csv: {err}"))
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(err: serde_json::Error) -> Self {
        ValuationError::ImportError(format!("json: {err}"))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ValuationError>;
