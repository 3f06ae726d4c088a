//! Error taxonomy for the diagnosis pipeline.
//!
//! Every stage returns [`Result`]. Variants carry the offending identifiers
//! and sizes so a caller can act on them without re-deriving pipeline state.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the diagnosis pipeline and its evaluators.
#[derive(Error, Debug)]
pub enum DiagnosisError {
    /// Caller-supplied data is unusable (empty collections, non-finite
    /// weights, malformed ingestion rows).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Variable index and coefficient data disagree. Always a pipeline bug.
    #[error("variable index mismatch: {reason}")]
    InvalidIndex { reason: String },

    /// The execution substrate cannot run right now.
    #[error("backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// A blocking evaluator call exceeded its caller-supplied bound.
    #[error("{operation} timed out after {:.3}s", timeout.as_secs_f64())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// The problem does not fit the substrate.
    #[error(
        "circuit too large: {requested_qubits} qubits (max {max_qubits}), \
         depth {requested_depth} (max {max_depth})"
    )]
    InvalidCircuit {
        requested_qubits: usize,
        max_qubits: usize,
        requested_depth: usize,
        max_depth: usize,
    },

    /// Reading an ingestion file failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DiagnosisError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn invalid_index(reason: impl Into<String>) -> Self {
        Self::InvalidIndex {
            reason: reason.into(),
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::InvalidCircuit { .. })
    }

    /// True when an orchestration layer may try another evaluator.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DiagnosisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(DiagnosisError::invalid_input("empty").is_client_error());
        let circuit = DiagnosisError::InvalidCircuit {
            requested_qubits: 40,
            max_qubits: 20,
            requested_depth: 2,
            max_depth: 16,
        };
        assert!(circuit.is_client_error());
        assert!(!DiagnosisError::invalid_index("x").is_client_error());
        assert!(!DiagnosisError::backend_unavailable("sim", "down").is_client_error());
    }

    #[test]
    fn test_backend_failure_classification() {
        assert!(DiagnosisError::backend_unavailable("hw", "offline").is_backend_failure());
        let timeout = DiagnosisError::Timeout {
            operation: "estimate_energy".into(),
            timeout: Duration::from_millis(5),
        };
        assert!(!timeout.is_backend_failure());
    }

    #[test]
    fn test_messages_carry_context() {
        let e = DiagnosisError::InvalidCircuit {
            requested_qubits: 40,
            max_qubits: 20,
            requested_depth: 3,
            max_depth: 16,
        };
        let msg = e.to_string();
        assert!(msg.contains("40 qubits"));
        assert!(msg.contains("max 20"));

        let e = DiagnosisError::backend_unavailable("ibm_hw", "queue closed");
        assert_eq!(e.to_string(), "backend 'ibm_hw' unavailable: queue closed");
    }
}
