use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};
use crate::keys::SEPARATOR;

/// Content hash naming one revision of a project's source model.
///
/// The hash is opaque to the pipeline; it only has to be usable as a single
/// key segment. New uploads get a new hash, so derivative keys of different
/// revisions never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionHash(String);

impl RevisionHash {
    /// Wrap an externally computed hash, validating it as a key segment.
    pub fn new(hash: impl Into<String>) -> KeyResult<Self> {
        let hash = hash.into();
        if hash.is_empty() {
            return Err(KeyError::invalid_key(hash, "revision hash must not be empty"));
        }
        if hash.contains(SEPARATOR) || hash.contains('\\') {
            return Err(KeyError::invalid_key(
                hash,
                "revision hash must not contain path separators",
            ));
        }
        if hash.chars().any(char::is_control) {
            return Err(KeyError::invalid_key(
                hash,
                "revision hash contains control characters",
            ));
        }
        if hash == "." || hash == ".." {
            return Err(KeyError::invalid_key(hash, "revision hash must not be '.' or '..'"));
        }
        Ok(Self(hash))
    }

    /// Compute the revision hash of uploaded source bytes (BLAKE3, hex).
    pub fn of_content(data: &[u8]) -> Self {
        Self(hex::encode(blake3::hash(data).as_bytes()))
    }

    /// The hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for RevisionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RevisionHash {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RevisionHash> for String {
    fn from(hash: RevisionHash) -> Self {
        hash.0
    }
}
