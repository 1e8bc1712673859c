use cadpub_cache::CacheError;
use cadpub_store::StoreError;
use cadpub_types::ArtifactKind;

/// Errors from descriptor assembly.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// A mandatory artifact is not published.
    #[error("revision is incomplete: {kind} is missing ({key})")]
    IncompleteRevision { kind: ArtifactKind, key: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// A link could not be built or failed validation.
    #[error("invalid link: {0}")]
    Link(String),
}

/// Result alias for descriptor operations.
pub type DescriptorResult<T> = Result<T, DescriptorError>;
