use cadpub_types::ArtifactKind;

/// Errors talking to a conversion engine.
///
/// These are failures of the conversation with the engine, not conversion
/// outcomes: a conversion the engine ran and rejected is reported through
/// [`JobStatus::Failed`](crate::JobStatus::Failed).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine could not be reached or refused the request.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The engine does not know the job or output id.
    #[error("unknown engine job: {0}")]
    UnknownJob(String),

    /// Transfer of a document or output failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No registered engine declares the capability.
    #[error("no engine can produce {0}")]
    NoCapableEngine(ArtifactKind),

    /// The export option table is not usable.
    #[error("invalid export options: {0}")]
    InvalidOptions(String),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
