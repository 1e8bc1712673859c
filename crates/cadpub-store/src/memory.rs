use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};
use crate::signer::UrlSigner;
use crate::traits::{ensure_key_safe, ObjectStore};

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Payloads are reference-counted
/// [`Bytes`], so reads are cheap clones.
pub struct InMemoryObjectStore {
    bucket: String,
    objects: RwLock<HashMap<String, Bytes>>,
    signer: UrlSigner,
}

impl InMemoryObjectStore {
    /// Create a new empty store for `bucket` with a local signer.
    pub fn new(bucket: impl Into<String>) -> Self {
        let signer = UrlSigner::new("https://storage.invalid/", "in-memory")
            .expect("static base URL is valid");
        Self::with_signer(bucket, signer)
    }

    /// Create a new empty store that signs URLs with `signer`.
    pub fn with_signer(bucket: impl Into<String>, signer: UrlSigner) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
            signer,
        }
    }

    /// The signer used for download links.
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Sorted list of all keys in the store.
    pub fn keys(&self) -> Vec<String> {
        let map = self.objects.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        ensure_key_safe(to)?;
        let mut map = self.objects.write().expect("lock poisoned");
        let data = map
            .remove(from)
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        map.insert(to.to_string(), data);
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        ensure_key_safe(key)?;
        self.signer.sign(&self.bucket, key, ttl)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("bucket", &self.bucket)
            .field("object_count", &self.len())
            .finish()
    }
}
