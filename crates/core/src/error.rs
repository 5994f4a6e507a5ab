//! Error types for Tally
//!
//! One taxonomy is shared by every layer so that callers can match on the
//! failure class without knowing which crate produced it. We use `thiserror`
//! for automatic `Display` and `Error` trait implementations.
//!
//! | Variant | Scope | Policy |
//! |---------|-------|--------|
//! | `Parse` | one specification document | fatal to that document only |
//! | `CacheCorruption` | persisted snapshot | forces a full rebuild, never served |
//! | `ExecutorLaunch` | one batch | retried per policy, then reported |
//! | `Timeout` | one batch | retried per policy, then `FailedAfterRetries` |
//! | `InvalidConfig` | configuration | fatal to the caller |
//!
//! Unparsable test sources are not errors: they surface as
//! [`crate::Diagnostic`]s with [`crate::DiagnosticKind::UnparsableFile`].

use std::io;
use thiserror::Error;

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by all Tally crates
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, subprocess pipes)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A specification document could not be parsed
    #[error("parse error in {path}: {reason}")]
    Parse {
        /// Document path
        path: String,
        /// Human-readable reason, including the offending line
        reason: String,
    },

    /// A persisted artifact failed checksum or fingerprint validation
    #[error("cache corruption in {path}: {reason}")]
    CacheCorruption {
        /// Path of the persisted artifact
        path: String,
        /// What did not match
        reason: String,
    },

    /// The external executor could not be started at all
    #[error("executor launch failed for batch {batch}: {reason}")]
    ExecutorLaunch {
        /// Batch index
        batch: usize,
        /// Launch failure description
        reason: String,
    },

    /// A batch exceeded its deadline
    #[error("batch {batch} timed out after {timeout_ms}ms")]
    Timeout {
        /// Batch index
        batch: usize,
        /// Deadline that was exceeded
        timeout_ms: u64,
    },

    /// Configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invariant violation inside the engine
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse error for a document
    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a cache corruption error
    pub fn corruption(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CacheCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the batch-level retry policy applies to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ExecutorLaunch { .. } | Error::Timeout { .. })
    }
}
