//! Error types for the sync-gate validator.
//!
//! Content and configuration problems never surface through this module;
//! those travel as check results. `GateError` covers the remaining faults:
//! unusable command lines, I/O failures outside a check, and violations of
//! the one-result-per-slot rule.

use thiserror::Error;

/// Errors that abort a validation run outright.
#[derive(Debug, Error)]
pub enum GateError {
    /// The command line could not be turned into run options.
    #[error("{message}")]
    Usage {
        /// Description of the unusable option combination.
        message: String,
    },

    /// A check attempted to overwrite an already-stored result.
    #[error("refusing to overwrite result for check '{check}' on '{artifact}'")]
    ResultOverwrite {
        /// Identifier of the artifact whose slot was already occupied.
        artifact: String,
        /// Name of the check whose result would have been replaced.
        check: String,
    },

    /// JSON serialization failed while computing a canonical digest.
    #[error("canonical serialization failed: {0}")]
    Canonical(#[from] serde_json::Error),

    /// An I/O operation failed outside of a check.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GateError>;
