use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cadpub_types::keys::staging_key;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// A bucket of objects addressed by opaque keys.
///
/// All implementations must satisfy these invariants:
/// - `put` replaces the object atomically: readers see the old bytes or the
///   new bytes, never a mix.
/// - `rename` is atomic with respect to readers of the destination key.
/// - `signed_url` does not check existence; callers that need a link only
///   for present objects check [`ObjectStore::exists`] first.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store serves.
    fn bucket(&self) -> &str;

    /// Write an object, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()>;

    /// Read an object. Returns `Ok(None)` if it does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete an object. Returns `true` if the object existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Move an object to a new key, replacing the destination.
    ///
    /// Returns [`StoreError::NotFound`] if `from` does not exist.
    async fn rename(&self, from: &str, to: &str) -> StoreResult<()>;

    /// Produce a time-limited download URL for `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StoreResult<String>;

    /// Upload `data` under a fresh staging key and return that key.
    ///
    /// Nothing is visible under `key` until [`ObjectStore::rename`] finalizes
    /// the staged object.
    async fn stage(&self, key: &str, data: Bytes) -> StoreResult<String> {
        let token = Uuid::now_v7().simple().to_string();
        let staged = staging_key(key, &token);
        self.put(&staged, data).await?;
        debug!(key, staged = %staged, "object staged");
        Ok(staged)
    }

    /// Upload all-or-nothing: stage, then rename into place.
    ///
    /// A failed rename removes the staged object.
    async fn put_staged(&self, key: &str, data: Bytes) -> StoreResult<()> {
        let staged = self.stage(key, data).await?;
        if let Err(e) = self.rename(&staged, key).await {
            if let Err(cleanup) = self.delete(&staged).await {
                warn!(staged = %staged, error = %cleanup, "failed to drop staged object");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Basic key validation shared by the adapters.
///
/// Rejects empty or oversized keys, absolute keys, parent traversal and
/// control characters.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    let reject = |reason: &str| {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        })
    };
    if key.is_empty() {
        return reject("key must not be empty");
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return reject("key is too long");
    }
    if key.starts_with('/') || key.split('/').any(|s| s == "." || s == "..") {
        return reject("key must be relative and must not contain '.' or '..' segments");
    }
    if key.chars().any(|c| c.is_control() || c == '\\') {
        return reject("key contains control characters or backslashes");
    }
    Ok(())
}
