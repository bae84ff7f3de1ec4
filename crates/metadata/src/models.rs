//! Database models mapping to the catalog schema.

use sqlx::FromRow;
use time::OffsetDateTime;

/// Catalog record for an archived photo.
///
/// `digest` is the lowercase hex content digest and carries a UNIQUE
/// constraint, so one photo row exists per distinct content regardless of
/// how many times the same bytes are imported.
#[derive(Debug, Clone, FromRow)]
pub struct PhotoRow {
    pub photo_id: i64,
    pub digest: String,
    pub file_type: String,
    /// Capture time from embedded metadata, when the source carried one.
    pub taken_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Publication ledger record for an imported photo.
#[derive(Debug, Clone, FromRow)]
pub struct ImportRow {
    pub photo_id: i64,
    /// Content digest, duplicated from the photo row so the ledger can be
    /// consulted by digest without a join.
    pub digest: String,
    /// Source path the photo was first imported from.
    pub import_path: String,
    /// Free-form label for the import batch (camera roll, scan set, etc.).
    pub import_source: Option<String>,
    /// Source file modification time recorded at import.
    pub file_date: Option<OffsetDateTime>,
    /// Whether the photo and its renditions have been published remotely.
    pub published: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
