use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use cadpub_types::ArtifactKind;

use crate::error::EngineResult;
use crate::options::ExportOptions;

/// Identifier of a job on the remote engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineJobId(pub String);

impl fmt::Display for EngineJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to the output of a finished job.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutputRef(pub String);

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input document handed to the engine: its storage key and a time-limited
/// URL the engine downloads it from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRef {
    pub key: String,
    pub url: String,
}

/// Why the engine gave up on a conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The document is not of a type the exporter handles (e.g. a drawing
    /// requested from a part without sheets).
    UnsupportedDocumentType,
    /// The translator for the requested format is not installed.
    TranslatorUnavailable,
    /// Any other failure reported by the engine.
    Error(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedDocumentType => f.write_str("document type is not supported"),
            Self::TranslatorUnavailable => f.write_str("translator is not available"),
            Self::Error(text) => f.write_str(text),
        }
    }
}

/// State of a remote job as seen by a poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded(OutputRef),
    Failed(FailureReason),
}

impl JobStatus {
    /// Returns `true` once the job will not change state again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A remote model-processing engine.
///
/// Implementations must be safe to drive from many concurrent jobs.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Artifact kinds this engine can produce.
    fn capabilities(&self) -> &[ArtifactKind];

    /// Whether this engine can produce `kind`.
    fn supports(&self, kind: ArtifactKind) -> bool {
        self.capabilities().contains(&kind)
    }

    /// Submit a conversion of `document` into `kind`.
    async fn submit(
        &self,
        document: &DocumentRef,
        kind: ArtifactKind,
        options: &ExportOptions,
    ) -> EngineResult<EngineJobId>;

    /// Current status of a submitted job.
    async fn poll(&self, job: &EngineJobId) -> EngineResult<JobStatus>;

    /// Download the output of a succeeded job.
    async fn fetch_output(&self, output: &OutputRef) -> EngineResult<Bytes>;

    /// Ask the engine to abandon a job. Best effort.
    async fn cancel(&self, _job: &EngineJobId) -> EngineResult<()> {
        Ok(())
    }
}
