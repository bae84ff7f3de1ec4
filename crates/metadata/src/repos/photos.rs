//! Photo catalog repository.

use crate::error::MetadataResult;
use crate::models::PhotoRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Fields for a new catalog entry.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    /// Lowercase hex content digest.
    pub digest: String,
    /// Normalized lowercase file extension of the original.
    pub file_type: String,
    /// Capture time from embedded metadata, if present.
    pub taken_at: Option<OffsetDateTime>,
}

/// Repository for photo catalog operations.
#[async_trait]
pub trait PhotoRepo: Send + Sync {
    /// Insert a photo record, or return the existing one when the digest is
    /// already cataloged.
    ///
    /// Re-importing identical content must converge on the same photo id, so
    /// a lost insert race resolves by fetching the winner's row. The second
    /// tuple element is true when this call created the row.
    async fn get_or_create_photo(&self, photo: &NewPhoto) -> MetadataResult<(PhotoRow, bool)>;

    /// Get a photo by id.
    async fn get_photo(&self, photo_id: i64) -> MetadataResult<Option<PhotoRow>>;

    /// Get a photo by content digest.
    async fn get_photo_by_digest(&self, digest: &str) -> MetadataResult<Option<PhotoRow>>;

    /// List every cataloged photo id in ascending order.
    async fn list_photo_ids(&self) -> MetadataResult<Vec<i64>>;
}
