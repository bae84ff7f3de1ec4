//! Publication ledger repository.

use crate::error::MetadataResult;
use crate::models::ImportRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for import and publication ledger operations.
#[async_trait]
pub trait ImportRepo: Send + Sync {
    /// Record an import for a photo.
    ///
    /// The first import wins: re-importing the same content leaves the
    /// original provenance (path, source, file date) untouched. The digest is
    /// stored alongside the photo id so the ledger stands on its own for
    /// digest lookups. Returns true when this call created the record.
    async fn record_import(
        &self,
        photo_id: i64,
        digest: &str,
        import_path: &str,
        import_source: Option<&str>,
        file_date: Option<OffsetDateTime>,
    ) -> MetadataResult<bool>;

    /// Get the import record for a photo.
    async fn get_import(&self, photo_id: i64) -> MetadataResult<Option<ImportRow>>;

    /// Whether the photo's artifacts are recorded as published.
    async fn is_published(&self, photo_id: i64) -> MetadataResult<bool>;

    /// Whether the content with this digest is recorded as published.
    async fn is_published_by_digest(&self, digest: &str) -> MetadataResult<bool>;

    /// Mark a photo's artifacts as published.
    ///
    /// The flag only moves from false to true; marking an already published
    /// photo is a no-op. Returns [`MetadataError::NotFound`] when no import
    /// record exists for the photo.
    ///
    /// [`MetadataError::NotFound`]: crate::error::MetadataError::NotFound
    async fn mark_published(&self, photo_id: i64) -> MetadataResult<()>;
}
