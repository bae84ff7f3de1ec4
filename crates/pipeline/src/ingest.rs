//! Ingestion driver: one file through the whole pipeline.

use crate::archive::LocalArchive;
use crate::derive::{derive_all, DeriveOptions, RenditionOutcome};
use crate::error::{PipelineError, PipelineResult};
use crate::publish::{Publisher, ORIGINAL_TIER};
use shoebox_core::rendition::file_type_from_name;
use shoebox_core::{ArchivePath, ContentDigest, RenditionClass, CATALOG};
use shoebox_metadata::{MetadataStore, NewPhoto};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

/// Options for a single ingestion.
#[derive(Clone, Debug, Default)]
pub struct IngestOptions {
    /// Publish the original and renditions to the remote store.
    pub upload: bool,
    /// Regenerate renditions even when they already exist.
    pub regenerate: bool,
    /// Label for the import batch. Defaults to the local hostname.
    pub import_source: Option<String>,
}

/// Outcome of one artifact upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub key: String,
    pub result: PipelineResult<()>,
}

/// What happened to one ingested file.
#[derive(Debug)]
pub struct IngestReport {
    pub photo_id: i64,
    pub digest: ContentDigest,
    pub archived_path: PathBuf,
    /// True when this ingestion created the catalog row (not a duplicate).
    pub newly_cataloged: bool,
    pub renditions: Vec<RenditionOutcome>,
    pub uploads: Vec<UploadOutcome>,
    /// Ledger state after this run.
    pub published: bool,
}

/// Drives a file through digest, catalog, archive, derive, and publish.
pub struct Ingestor {
    archive: LocalArchive,
    publisher: Publisher,
    metadata: Arc<dyn MetadataStore>,
    jpeg_quality: u8,
}

impl Ingestor {
    pub fn new(
        archive: LocalArchive,
        publisher: Publisher,
        metadata: Arc<dyn MetadataStore>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            archive,
            publisher,
            metadata,
            jpeg_quality,
        }
    }

    /// Ingest a single file.
    ///
    /// Identity and archival failures are fatal and propagate; rendition and
    /// upload failures are collected in the report. The ledger is marked
    /// published only when the original and the full rendition catalog were
    /// all confirmed uploaded in this run.
    #[instrument(skip(self, opts))]
    pub async fn ingest_file(&self, path: &Path, opts: &IngestOptions) -> PipelineResult<IngestReport> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::SourceUnreadable {
                path: path.to_path_buf(),
                message: "not a valid file name".to_string(),
            })?;
        let file_type =
            file_type_from_name(file_name).ok_or_else(|| PipelineError::SourceUnreadable {
                path: path.to_path_buf(),
                message: "no file extension".to_string(),
            })?;

        let digest = self.archive.digest_file(path).await?;
        let archive_path = ArchivePath::from_digest(&digest);

        let file_date = file_mtime(path);
        let taken_at = capture_time(path).await.or(file_date);

        let (photo, newly_cataloged) = self
            .metadata
            .get_or_create_photo(&NewPhoto {
                digest: digest.to_hex(),
                file_type: file_type.clone(),
                taken_at,
            })
            .await?;

        if !newly_cataloged {
            info!(photo_id = photo.photo_id, digest = %digest, "duplicate content, reusing catalog entry");
        }

        let (archived_path, _) = self
            .archive
            .archive_original(path, &archive_path, &file_type)
            .await?;

        let classes: Vec<&'static RenditionClass> = CATALOG.iter().collect();
        let renditions = derive_all(
            &archived_path,
            self.archive.root(),
            &archive_path,
            &classes,
            &DeriveOptions {
                regenerate: opts.regenerate,
                quality: self.jpeg_quality,
            },
        )
        .await;

        for outcome in &renditions {
            if let Err(e) = &outcome.result {
                warn!(class = outcome.class.code, error = %e, "rendition failed");
            }
        }

        // Provenance is best-effort and first-import-wins.
        let import_source = opts
            .import_source
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok());
        self.metadata
            .record_import(
                photo.photo_id,
                &photo.digest,
                &path.to_string_lossy(),
                import_source.as_deref(),
                file_date,
            )
            .await?;

        let mut uploads = Vec::new();
        let mut published = self.metadata.is_published(photo.photo_id).await?;

        if opts.upload && !published {
            let original_key = archive_path.original_key(&file_type);
            let result = self
                .publisher
                .publish_file(&archived_path, &original_key, ORIGINAL_TIER)
                .await;
            uploads.push(UploadOutcome {
                key: original_key,
                result,
            });

            for class in &classes {
                let local = archive_path.local_rendition(self.archive.root(), class.code);
                let key = archive_path.rendition_key(class.code);
                let result = self.publisher.publish_file(&local, &key, class.tier).await;
                uploads.push(UploadOutcome { key, result });
            }

            // Full artifact set (original + every catalog class) must have
            // succeeded in this run before the ledger flips.
            let all_uploaded = uploads.iter().all(|u| u.result.is_ok());
            if all_uploaded {
                self.metadata.mark_published(photo.photo_id).await?;
                published = true;
            } else {
                let failed = uploads.iter().filter(|u| u.result.is_err()).count();
                warn!(
                    photo_id = photo.photo_id,
                    failed, "partial upload, ledger stays unpublished"
                );
            }
        }

        info!(
            photo_id = photo.photo_id,
            digest = %digest,
            published,
            "ingested"
        );

        Ok(IngestReport {
            photo_id: photo.photo_id,
            digest,
            archived_path,
            newly_cataloged,
            renditions,
            uploads,
            published,
        })
    }
}

/// Source file modification time, if available.
fn file_mtime(path: &Path) -> Option<OffsetDateTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(OffsetDateTime::from)
}

/// Capture time from embedded EXIF `DateTimeOriginal`, if present.
async fn capture_time(path: &Path) -> Option<OffsetDateTime> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_exif_datetime(&path))
        .await
        .ok()
        .flatten()
}

fn read_exif_datetime(path: &Path) -> Option<OffsetDateTime> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = std::io::BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;

    // Rendered as "YYYY-MM-DD HH:MM:SS"; cameras record local time with no
    // zone, so it is taken as UTC.
    let text = field.display_value().to_string();
    let format =
        time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    time::PrimitiveDateTime::parse(&text, &format)
        .ok()
        .map(|dt| dt.assume_utc())
}
