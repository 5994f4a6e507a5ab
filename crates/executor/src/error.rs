//! Error types for batch execution.
//!
//! A batch attempt fails in one of three ways, none of which is an in-test
//! failure: the executor could not be started, the batch exceeded its
//! deadline, or the run was cancelled. Failures are serializable so that
//! finished batches can be journaled with the reason they failed.

use serde::{Deserialize, Serialize};

/// Failure of one batch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecError {
    /// The executor process could not be started
    #[error("executor launch failed: {reason}")]
    Launch {
        /// Launch failure description
        reason: String,
    },

    /// The attempt exceeded its deadline and was killed
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that was exceeded
        timeout_ms: u64,
    },

    /// The run was cancelled before or during the attempt
    #[error("cancelled")]
    Cancelled,
}

impl ExecError {
    /// Create a launch error
    pub fn launch(reason: impl Into<String>) -> Self {
        ExecError::Launch {
            reason: reason.into(),
        }
    }

    /// Whether the retry policy applies
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::Launch { .. } | ExecError::Timeout { .. })
    }

    /// Convert into the shared error taxonomy for batch `batch`
    pub fn into_core(self, batch: usize) -> tally_core::Error {
        match self {
            ExecError::Launch { reason } => tally_core::Error::ExecutorLaunch { batch, reason },
            ExecError::Timeout { timeout_ms } => tally_core::Error::Timeout { batch, timeout_ms },
            ExecError::Cancelled => tally_core::Error::internal(format!("batch {} cancelled", batch)),
        }
    }
}

/// Result type for one batch attempt
pub type ExecResult<T> = std::result::Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_classes() {
        assert!(ExecError::launch("no such file").is_retryable());
        assert!(ExecError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(!ExecError::Cancelled.is_retryable());
    }

    #[test]
    fn test_into_core_keeps_batch() {
        let err = ExecError::Timeout { timeout_ms: 1500 }.into_core(3);
        assert!(err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("batch 3"));
        assert!(msg.contains("1500"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&ExecError::Timeout { timeout_ms: 5 }).unwrap();
        assert_eq!(json, r#"{"kind":"timeout","timeout_ms":5}"#);
    }
}
