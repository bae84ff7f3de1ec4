//! Object store trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use shoebox_core::Tier;
use std::time::Duration;

/// Options applied when storing an artifact.
#[derive(Clone, Copy, Debug)]
pub struct PutOptions {
    /// Content type recorded on the object so browsers render it inline.
    pub content_type: &'static str,
    /// Access tier, resolved by the backend to a concrete ACL.
    pub tier: Tier,
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if the backend reports one).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if the backend reports one).
    pub content_type: Option<String>,
}

/// Remote object store for published photo artifacts.
///
/// Keys are the relative archive keys produced by
/// [`shoebox_core::ArchivePath`], so the remote layout mirrors the local
/// archive exactly. Implementations are injected (`Arc<dyn ObjectStore>`)
/// rather than held in module state so tests can substitute a fake store.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's metadata without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Fetch an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Store an object with the given content type and access tier.
    ///
    /// Puts at the same key are idempotent overwrites; no internal retries.
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<()>;

    /// Change an existing object's access tier without re-uploading content.
    async fn set_tier(&self, key: &str, tier: Tier) -> StorageResult<()>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Produce a time-limited URL granting read access to a restricted
    /// object.
    async fn signed_url(&self, key: &str, expiry: Duration) -> StorageResult<String>;

    /// Static backend identifier for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends
    /// that need no connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
