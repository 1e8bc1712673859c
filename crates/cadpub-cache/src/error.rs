use cadpub_store::StoreError;
use cadpub_types::KeyError;

/// Errors from local cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key cannot be mapped to a local path.
    #[error("cache key error: {0}")]
    Key(#[from] KeyError),

    /// Re-deriving an entry from object storage failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error on the local disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking cache task failed to complete.
    #[error("cache task failed: {0}")]
    Task(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
