//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{ImportRow, PhotoRow};
use crate::repos::{ImportRepo, NewPhoto, PhotoRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: PhotoRepo + ImportRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Config(format!("cannot create database dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures when the
            // reconciler runs with many workers.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PhotoRepo for SqliteStore {
    #[instrument(skip(self, photo), fields(digest = %photo.digest))]
    async fn get_or_create_photo(&self, photo: &NewPhoto) -> MetadataResult<(PhotoRow, bool)> {
        let now = OffsetDateTime::now_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO photos (digest, file_type, taken_at, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(digest) DO NOTHING
            "#,
        )
        .bind(&photo.digest)
        .bind(&photo.file_type)
        .bind(photo.taken_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            debug!("cataloged new photo");
        }

        let row = self
            .get_photo_by_digest(&photo.digest)
            .await?
            .ok_or_else(|| {
                MetadataError::Internal(format!(
                    "photo row missing after insert for digest {}",
                    photo.digest
                ))
            })?;

        Ok((row, created))
    }

    async fn get_photo(&self, photo_id: i64) -> MetadataResult<Option<PhotoRow>> {
        let row = sqlx::query_as::<_, PhotoRow>("SELECT * FROM photos WHERE photo_id = ?")
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_photo_by_digest(&self, digest: &str) -> MetadataResult<Option<PhotoRow>> {
        let row = sqlx::query_as::<_, PhotoRow>("SELECT * FROM photos WHERE digest = ?")
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_photo_ids(&self) -> MetadataResult<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as("SELECT photo_id FROM photos ORDER BY photo_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl ImportRepo for SqliteStore {
    #[instrument(skip(self, import_path, import_source, file_date))]
    async fn record_import(
        &self,
        photo_id: i64,
        digest: &str,
        import_path: &str,
        import_source: Option<&str>,
        file_date: Option<OffsetDateTime>,
    ) -> MetadataResult<bool> {
        let now = OffsetDateTime::now_utc();

        // The digest carries its own UNIQUE constraint, so the bare conflict
        // target covers both keys (they are 1:1 via the photos table).
        let result = sqlx::query(
            r#"
            INSERT INTO imports (photo_id, digest, import_path, import_source, file_date, published, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(photo_id)
        .bind(digest)
        .bind(import_path)
        .bind(import_source)
        .bind(file_date)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            debug!("recorded import provenance");
        }
        Ok(created)
    }

    async fn get_import(&self, photo_id: i64) -> MetadataResult<Option<ImportRow>> {
        let row = sqlx::query_as::<_, ImportRow>("SELECT * FROM imports WHERE photo_id = ?")
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn is_published(&self, photo_id: i64) -> MetadataResult<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT published FROM imports WHERE photo_id = ?")
                .bind(photo_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(published,)| published).unwrap_or(false))
    }

    async fn is_published_by_digest(&self, digest: &str) -> MetadataResult<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT published FROM imports WHERE digest = ?")
                .bind(digest)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(published,)| published).unwrap_or(false))
    }

    #[instrument(skip(self))]
    async fn mark_published(&self, photo_id: i64) -> MetadataResult<()> {
        let now = OffsetDateTime::now_utc();

        let result = sqlx::query(
            "UPDATE imports SET published = 1, updated_at = ? WHERE photo_id = ? AND published = 0",
        )
        .bind(now)
        .bind(photo_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish "already published" (fine) from "no ledger row".
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT photo_id FROM imports WHERE photo_id = ?")
                    .bind(photo_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                return Err(MetadataError::NotFound(format!(
                    "no import record for photo {photo_id}"
                )));
            }
        } else {
            debug!("ledger marked published");
        }

        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
-- Photo catalog: one row per distinct content digest
CREATE TABLE IF NOT EXISTS photos (
    photo_id INTEGER PRIMARY KEY AUTOINCREMENT,
    digest TEXT NOT NULL UNIQUE,
    file_type TEXT NOT NULL,
    taken_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_photos_digest ON photos(digest);

-- Publication ledger: first-import provenance plus the published flag.
-- The digest is duplicated from photos so the ledger answers digest
-- lookups on its own.
CREATE TABLE IF NOT EXISTS imports (
    photo_id INTEGER PRIMARY KEY REFERENCES photos(photo_id) ON DELETE CASCADE,
    digest TEXT NOT NULL UNIQUE,
    import_path TEXT NOT NULL,
    import_source TEXT,
    file_date TEXT,
    published INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_imports_published ON imports(published);
"#;
