//! Durability error types

use std::io;
use thiserror::Error;

/// Errors raised while reading or writing durable files
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// Underlying I/O failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A file failed validation and must not be trusted
    #[error("corrupt file {path}: {reason}")]
    Corrupt {
        /// File path
        path: String,
        /// What failed
        reason: String,
    },

    /// File written by an incompatible format version
    #[error("unsupported format version {version} in {path}")]
    UnsupportedVersion {
        /// File path
        path: String,
        /// Version found
        version: u16,
    },

    /// MessagePack encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DurabilityError {
    /// Create a corruption error
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        DurabilityError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the file should be discarded and rebuilt
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            DurabilityError::Corrupt { .. } | DurabilityError::UnsupportedVersion { .. }
        )
    }
}

impl From<rmp_serde::encode::Error> for DurabilityError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        DurabilityError::Serialization(e.to_string())
    }
}

impl From<DurabilityError> for tally_core::Error {
    fn from(e: DurabilityError) -> Self {
        match e {
            DurabilityError::Io(io) => tally_core::Error::Io(io),
            DurabilityError::Corrupt { path, reason } => tally_core::Error::corruption(path, reason),
            DurabilityError::UnsupportedVersion { path, version } => {
                tally_core::Error::corruption(path, format!("unsupported version {}", version))
            }
            DurabilityError::Serialization(msg) => tally_core::Error::serialization(msg),
        }
    }
}

/// Result type for durability operations
pub type DurabilityResult<T> = Result<T, DurabilityError>;
