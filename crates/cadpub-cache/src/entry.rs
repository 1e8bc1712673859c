use std::path::PathBuf;

/// A locally materialized artifact.
///
/// Lookups only stat the file. The content fingerprint is computed on
/// demand by [`LocalArtifactCache::fingerprint`](crate::LocalArtifactCache::fingerprint).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedEntry {
    /// Storage key the entry mirrors.
    pub key: String,
    /// Absolute location of the cached file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}
