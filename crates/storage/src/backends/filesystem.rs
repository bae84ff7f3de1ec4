//! Local filesystem storage backend.
//!
//! Mirrors the archive layout under a root directory. Useful for staging a
//! publication target on disk and for tests. Access tiers are tracked in
//! memory only, since a plain filesystem has no ACL concept that maps onto
//! object tiers.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectMeta, ObjectStore, PutOptions};
use async_trait::async_trait;
use bytes::Bytes;
use shoebox_core::Tier;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

/// Filesystem object store rooted at a directory.
pub struct FilesystemBackend {
    root: PathBuf,
    tiers: RwLock<HashMap<String, Tier>>,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            tiers: RwLock::new(HashMap::new()),
        })
    }

    /// Tier recorded for a key by a previous put or set_tier in this
    /// process, if any.
    pub async fn recorded_tier(&self, key: &str) -> Option<Tier> {
        self.tiers.read().await.get(key).copied()
    }

    /// Resolve a key to a path under the root, rejecting keys that could
    /// escape it.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn map_read_error(err: std::io::Error, key: &str) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| map_read_error(e, key))?;

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
            content_type: None,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        let data = fs::read(&path).await.map_err(|e| map_read_error(e, key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len(), tier = %opts.tier))]
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<()> {
        let path = self.key_path(key)?;
        self.ensure_parent(&path).await?;

        // Write to a uniquely named temp file, fsync, then rename so a
        // concurrent reader never observes a partial object.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        self.tiers
            .write()
            .await
            .insert(key.to_string(), opts.tier);

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem", tier = %tier))]
    async fn set_tier(&self, key: &str, tier: Tier) -> StorageResult<()> {
        let path = self.key_path(key)?;
        if !fs::try_exists(&path).await.map_err(StorageError::Io)? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.tiers.write().await.insert(key.to_string(), tier);
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| map_read_error(e, key))?;
        self.tiers.write().await.remove(key);
        Ok(())
    }

    async fn signed_url(&self, _key: &str, _expiry: Duration) -> StorageResult<String> {
        Err(StorageError::Unsupported {
            backend: "filesystem",
            operation: "signed_url",
        })
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
