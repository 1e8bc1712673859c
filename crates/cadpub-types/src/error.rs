use thiserror::Error;

/// Errors produced while constructing identities or working with keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A constructor argument is unusable (e.g. an empty project name).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A key or key component violates the naming scheme.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// An artifact kind name could not be recognized.
    #[error("unknown artifact kind: {0}")]
    UnknownKind(String),
}

impl KeyError {
    pub(crate) fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for key and identity operations.
pub type KeyResult<T> = Result<T, KeyError>;
