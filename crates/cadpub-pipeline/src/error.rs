use std::fmt;

use cadpub_store::StoreError;
use cadpub_types::{ArtifactKind, KeyError, Project, RevisionHash};
use serde::Serialize;

/// Why a derivative job failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The engine cannot produce this kind for this document. Never retried.
    Unsupported,
    /// Engine or storage I/O failed. Retried by the coordinator.
    Transient,
    /// The per-job deadline elapsed.
    Timeout,
    /// The revision was cancelled.
    Cancelled,
    /// A kind this one is converted from failed.
    DependencyFailed,
}

impl FailureClass {
    /// Whether the coordinator may retry a job that failed this way.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::DependencyFailed => "dependency_failed",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one derivative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind} failed ({class}) after {attempts} attempt(s): {message}")]
pub struct JobFailure {
    pub kind: ArtifactKind,
    pub class: FailureClass,
    pub message: String,
    /// Number of attempts made, including the failed one.
    pub attempts: u32,
}

impl JobFailure {
    pub fn new(kind: ArtifactKind, class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            kind,
            class,
            message: message.into(),
            attempts: 1,
        }
    }
}

/// Errors from the publishing pipeline itself (as opposed to per-job
/// failures, which are collected in a [`RevisionResult`](crate::RevisionResult)).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// At least one mandatory kind of the revision did not succeed.
    #[error("revision {hash} of {project} is not ready: {}", summarize(.failures))]
    RevisionFailed {
        project: Project,
        hash: RevisionHash,
        failures: Vec<JobFailure>,
    },
}

fn summarize(failures: &[JobFailure]) -> String {
    if failures.is_empty() {
        return "mandatory kinds were not published".into();
    }
    failures
        .iter()
        .map(|f| format!("{} ({})", f.kind, f.class))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(FailureClass::Transient.is_retryable());
        for class in [
            FailureClass::Unsupported,
            FailureClass::Timeout,
            FailureClass::Cancelled,
            FailureClass::DependencyFailed,
        ] {
            assert!(!class.is_retryable(), "{class}");
        }
    }

    #[test]
    fn revision_failed_lists_kinds() {
        let err = PipelineError::RevisionFailed {
            project: Project::new("Wrench").unwrap(),
            hash: RevisionHash::new("h1").unwrap(),
            failures: vec![JobFailure::new(
                ArtifactKind::Mesh,
                FailureClass::Unsupported,
                "document type is not supported",
            )],
        };
        assert_eq!(
            err.to_string(),
            "revision h1 of Wrench is not ready: mesh (unsupported)"
        );
    }
}
