use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cadpub_types::keys::{is_staging_key, local_path};
use tokio::fs;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::signer::UrlSigner;
use crate::traits::{ensure_key_safe, ObjectStore};

/// Filesystem-backed object store.
///
/// Objects live at `<root>/<bucket>/<key segments>`. Writes go to a
/// temporary file in the destination directory which is synced and then
/// renamed into place, so readers never observe partial objects.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
    signer: UrlSigner,
}

impl FsObjectStore {
    /// Open a store rooted at `root`, creating the bucket directory.
    pub async fn open(
        root: impl Into<PathBuf>,
        bucket: impl Into<String>,
        signer: UrlSigner,
    ) -> StoreResult<Self> {
        let store = Self {
            root: root.into(),
            bucket: bucket.into(),
            signer,
        };
        ensure_key_safe(&store.bucket)?;
        if store.bucket.contains('/') {
            return Err(StoreError::InvalidKey {
                key: store.bucket.clone(),
                reason: "bucket names must be a single path segment".into(),
            });
        }
        fs::create_dir_all(store.bucket_root()).await?;
        Ok(store)
    }

    /// Directory holding this bucket's objects.
    pub fn bucket_root(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    /// Path of the file backing `key`.
    pub fn object_path(&self, key: &str) -> StoreResult<PathBuf> {
        ensure_key_safe(key)?;
        let relative = local_path(key).map_err(|e| StoreError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.bucket_root().join(relative))
    }

    /// Remove the directories of a staged object once it is gone.
    ///
    /// Staging trees are private to one upload token, so nothing else can
    /// be writing below them. Stops at the first non-empty directory.
    async fn prune_staging_dirs(&self, key: &str, path: &Path) {
        if !is_staging_key(key) {
            return;
        }
        let root = self.bucket_root();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == root.as_path() || !current.starts_with(&root) {
                break;
            }
            match fs::remove_dir(current).await {
                Ok(()) => dir = current.parent(),
                Err(e) if e.kind() == ErrorKind::NotFound => dir = current.parent(),
                Err(e) => {
                    debug!(dir = %current.display(), error = %e, "staging directory kept");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()> {
        let path = self.object_path(key)?;
        let len = data.len();
        tokio::task::spawn_blocking(move || write_atomically(&path, &data))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        debug!(bucket = %self.bucket, key, len, "object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_staging_dirs(key, &path).await;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let source = self.object_path(from)?;
        let target = self.object_path(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::rename(&source, &target).await {
            Ok(()) => {
                self.prune_staging_dirs(from, &source).await;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(from.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        ensure_key_safe(key)?;
        self.signer.sign(&self.bucket, key, ttl)
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> StoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidKey {
            key: path.display().to_string(),
            reason: "object path has no parent directory".into(),
        })?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &tempfile::TempDir) -> FsObjectStore {
        let signer = UrlSigner::new("https://oss.example.org/", "secret").unwrap();
        FsObjectStore::open(dir.path(), "models", signer).await.unwrap()
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).await;
        s.put("cache-Wrench/h1/bom.csv", Bytes::from_static(b"part,qty"))
            .await
            .unwrap();
        let data = s.get("cache-Wrench/h1/bom.csv").await.unwrap().unwrap();
        assert_eq!(&data[..], b"part,qty");
        assert!(dir
            .path()
            .join("models/cache-Wrench/h1/bom.csv")
            .is_file());
    }

    #[tokio::test]
    async fn missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).await;
        assert!(s.get("cache-x/h/bom.csv").await.unwrap().is_none());
        assert!(!s.exists("cache-x/h/bom.csv").await.unwrap());
        assert!(!s.delete("cache-x/h/bom.csv").await.unwrap());
        assert!(matches!(
            s.rename("cache-x/h/bom.csv", "cache-x/h/bom.json").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn put_staged_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).await;
        s.put_staged("projects-Wrench/h1", Bytes::from_static(b"ipt"))
            .await
            .unwrap();
        assert!(s.exists("projects-Wrench/h1").await.unwrap());
    }

    fn staging_entries(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path().join("models"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("staging-"))
            .collect()
    }

    #[tokio::test]
    async fn finalized_uploads_leave_no_staging_directories() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).await;
        s.put_staged("projects-Wrench/h1", Bytes::from_static(b"ipt"))
            .await
            .unwrap();
        s.put_staged("cache-Wrench/h1/model.obj.zip", Bytes::from_static(b"obj"))
            .await
            .unwrap();
        assert!(staging_entries(&dir).is_empty());
        assert!(s.exists("cache-Wrench/h1/model.obj.zip").await.unwrap());
    }

    #[tokio::test]
    async fn dropped_staged_objects_leave_no_directories() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).await;
        let staged = s
            .stage("cache-Wrench/h1/bom.csv", Bytes::from_static(b"a,b"))
            .await
            .unwrap();
        assert_eq!(staging_entries(&dir).len(), 1);
        assert!(s.delete(&staged).await.unwrap());
        assert!(staging_entries(&dir).is_empty());
    }

    #[tokio::test]
    async fn deleting_a_final_object_keeps_sibling_directories() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).await;
        s.put("cache-Wrench/h1/bom.csv", Bytes::from_static(b"a,b")).await.unwrap();
        assert!(s.delete("cache-Wrench/h1/bom.csv").await.unwrap());
        assert!(dir.path().join("models/cache-Wrench/h1").is_dir());
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).await;
        assert!(s.put("a/../../b", Bytes::new()).await.is_err());
        assert!(s.get("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn rejects_nested_bucket_names() {
        let dir = tempfile::tempdir().unwrap();
        let signer = UrlSigner::new("https://oss.example.org/", "secret").unwrap();
        assert!(FsObjectStore::open(dir.path(), "a/b", signer).await.is_err());
    }
}
