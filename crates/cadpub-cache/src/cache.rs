use std::collections::HashMap;
use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use cadpub_store::ObjectStore;
use cadpub_types::keys::{local_path, SEPARATOR};
use cadpub_types::ArtifactKind;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::config::CacheConfig;
use crate::entry::CachedEntry;
use crate::error::{CacheError, CacheResult};

/// Number of idle per-key locks tolerated before the lock table is pruned.
const LOCK_TABLE_PRUNE_THRESHOLD: usize = 1024;

/// Disk-backed cache of published artifacts, keyed by storage key.
///
/// Safe to share between concurrent jobs and revisions: operations on the
/// same key are serialized, operations on different keys run in parallel.
pub struct LocalArtifactCache {
    config: CacheConfig,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LocalArtifactCache {
    /// Create a cache over `config.root`. The directory is created lazily.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a cache and make sure its root directory exists.
    pub async fn open(config: CacheConfig) -> CacheResult<Self> {
        tokio::fs::create_dir_all(&config.root).await?;
        Ok(Self::new(config))
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Local file backing `key`.
    pub fn path_for(&self, key: &str) -> CacheResult<PathBuf> {
        Ok(self.config.root.join(local_path(key)?))
    }

    /// Look up `key`. `Some` is a cache hit.
    ///
    /// Only the file metadata is read; use [`LocalArtifactCache::fingerprint`]
    /// when the content digest is needed.
    pub async fn get(&self, key: &str) -> CacheResult<Option<CachedEntry>> {
        let path = self.path_for(key)?;
        let _guard = self.lock(key).await;
        let entry = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(CachedEntry {
                key: key.to_string(),
                path,
                size: meta.len(),
            }),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        debug!(key, hit = entry.is_some(), "cache lookup");
        Ok(entry)
    }

    /// Store `data` under `key`, replacing any previous entry.
    ///
    /// The entry is durable on disk before this returns. Concurrent puts of
    /// the same key are serialized; the last writer wins.
    pub async fn put(&self, key: &str, data: Bytes) -> CacheResult<CachedEntry> {
        let path = self.path_for(key)?;
        let _guard = self.lock(key).await;
        let size = data.len() as u64;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &data))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))??;
        debug!(key, size, "cache entry written");
        Ok(CachedEntry {
            key: key.to_string(),
            path,
            size,
        })
    }

    /// BLAKE3 hex digest of a cached entry's current content.
    pub async fn fingerprint(&self, entry: &CachedEntry) -> CacheResult<String> {
        let _guard = self.lock(&entry.key).await;
        let path = entry.path.clone();
        tokio::task::spawn_blocking(move || hash_file(&path))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }

    /// Read the bytes of a cached entry.
    pub async fn read(&self, entry: &CachedEntry) -> CacheResult<Bytes> {
        Ok(Bytes::from(tokio::fs::read(&entry.path).await?))
    }

    /// Look up `key`, re-deriving the entry from `store` on a miss.
    ///
    /// Returns `Ok(None)` only when the object does not exist remotely
    /// either.
    pub async fn get_or_fetch(
        &self,
        key: &str,
        store: &dyn ObjectStore,
    ) -> CacheResult<Option<CachedEntry>> {
        if let Some(entry) = self.get(key).await? {
            return Ok(Some(entry));
        }
        match store.get(key).await? {
            Some(data) => {
                debug!(key, "cache miss re-derived from object store");
                Ok(Some(self.put(key, data).await?))
            }
            None => Ok(None),
        }
    }

    /// Drop the entry for `key`. Returns `true` if it existed.
    pub async fn evict(&self, key: &str) -> CacheResult<bool> {
        let path = self.path_for(key)?;
        let _guard = self.lock(key).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "cache entry evicted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Reference a cached entry from a descriptor.
    ///
    /// Entries up to `inline_limit_bytes` become `data:<mime>;base64,...`
    /// URIs. Larger entries are referenced by their path below the
    /// configured virtual prefix, e.g. `/data/cache-Wrench/h1/svf.zip`.
    pub async fn to_inline_reference(&self, entry: &CachedEntry) -> CacheResult<String> {
        if entry.size <= self.config.inline_limit_bytes {
            let data = self.read(entry).await?;
            let mime = content_type_for_key(&entry.key);
            return Ok(format!("data:{mime};base64,{}", STANDARD.encode(&data)));
        }
        let prefix = self.config.virtual_prefix.trim_end_matches('/');
        Ok(format!("{prefix}/{}", entry.key))
    }

    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("cache lock table poisoned");
            if locks.len() > LOCK_TABLE_PRUNE_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

impl std::fmt::Debug for LocalArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalArtifactCache")
            .field("root", &self.config.root)
            .finish()
    }
}

fn content_type_for_key(key: &str) -> &'static str {
    key.rsplit(SEPARATOR)
        .next()
        .and_then(ArtifactKind::for_file_name)
        .map(|kind| kind.content_type())
        .unwrap_or("application/octet-stream")
}

fn hash_file(path: &Path) -> CacheResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn write_atomically(path: &Path, data: &[u8]) -> CacheResult<()> {
    let parent = path.parent().ok_or_else(|| {
        CacheError::Io(io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}
