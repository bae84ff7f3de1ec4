//! Batch reconciler: closes rendition and tier gaps across the archive.
//!
//! Re-enters the pipeline at the derive/publish stages using the archive path
//! scheme and the ledger as source of truth. Photos are processed
//! independently under a bounded worker pool; summary counters are folded
//! from per-photo results, so workers share no mutable state.

use crate::archive::LocalArchive;
use crate::derive::{derive_rendition, DeriveOptions};
use crate::error::{PipelineError, PipelineResult};
use crate::publish::{Publisher, ORIGINAL_TIER};
use futures::stream::{self, StreamExt};
use shoebox_core::{ArchivePath, ContentDigest, RenditionClass, CATALOG, DEFAULT_JPEG_QUALITY};
use shoebox_metadata::{MetadataError, MetadataStore, PhotoRow};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Which photos a batch run operates on.
#[derive(Clone, Debug)]
pub enum Selection {
    All,
    Ids(Vec<i64>),
}

/// Parse an id selection like `1,5,10-20`.
pub fn parse_id_ranges(spec: &str) -> PipelineResult<Vec<i64>> {
    let mut ids = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = token.split_once('-') {
            let lo: i64 = lo
                .trim()
                .parse()
                .map_err(|_| PipelineError::InvalidSelection(token.to_string()))?;
            let hi: i64 = hi
                .trim()
                .parse()
                .map_err(|_| PipelineError::InvalidSelection(token.to_string()))?;
            if lo > hi {
                return Err(PipelineError::InvalidSelection(token.to_string()));
            }
            ids.extend(lo..=hi);
        } else {
            ids.push(
                token
                    .parse()
                    .map_err(|_| PipelineError::InvalidSelection(token.to_string()))?,
            );
        }
    }
    if ids.is_empty() {
        return Err(PipelineError::InvalidSelection(spec.to_string()));
    }
    Ok(ids)
}

/// Preferred derivation source for a reconcile run.
#[derive(Clone, Copy, Debug, Default)]
pub enum SourcePreference {
    /// The archived original, falling back to a covering rendition.
    #[default]
    Original,
    /// A specific rendition class (its box must cover every requested size).
    Rendition(&'static str),
}

/// Options for a reconcile run.
#[derive(Clone, Debug)]
pub struct ReconcileOptions {
    /// Rendition classes to (re)generate.
    pub sizes: Vec<&'static RenditionClass>,
    pub source: SourcePreference,
    pub quality: u8,
    /// Report decisions without writing or transferring anything.
    pub dry_run: bool,
    /// Regenerate renditions that already exist.
    pub force: bool,
    /// Delete artifacts fetched from the remote store after processing.
    pub cleanup: bool,
    /// Bounded parallelism across photos.
    pub workers: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            sizes: CATALOG.iter().collect(),
            source: SourcePreference::Original,
            quality: DEFAULT_JPEG_QUALITY,
            dry_run: false,
            force: false,
            cleanup: false,
            workers: 1,
        }
    }
}

/// Aggregate result of a reconcile run.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub photos: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub generated: u64,
    pub skipped: u64,
    pub uploaded: u64,
    pub fetched: u64,
    pub elapsed: Duration,
}

impl ReconcileSummary {
    /// Photos processed per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.photos as f64 / secs
        } else {
            0.0
        }
    }
}

/// Aggregate result of a tier-correction run.
#[derive(Debug, Default)]
pub struct TierUpdateSummary {
    pub examined: u64,
    pub updated: u64,
    pub missing: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct PhotoStats {
    generated: u64,
    skipped: u64,
    uploaded: u64,
    fetched: u64,
    class_failures: u64,
}

struct PhotoOutcome {
    photo_id: i64,
    stats: PhotoStats,
    error: Option<PipelineError>,
}

/// Batch driver over the photo catalog.
pub struct Reconciler {
    archive: LocalArchive,
    publisher: Publisher,
    metadata: Arc<dyn MetadataStore>,
}

impl Reconciler {
    pub fn new(archive: LocalArchive, publisher: Publisher, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            archive,
            publisher,
            metadata,
        }
    }

    async fn resolve_ids(&self, selection: &Selection) -> PipelineResult<Vec<i64>> {
        match selection {
            Selection::All => Ok(self.metadata.list_photo_ids().await?),
            Selection::Ids(ids) => Ok(ids.clone()),
        }
    }

    /// Recreate missing renditions (or all, with `force`) and publish newly
    /// generated ones. One photo's failure never stops the run.
    #[instrument(skip(self, opts))]
    pub async fn reconcile(
        &self,
        selection: &Selection,
        opts: &ReconcileOptions,
    ) -> PipelineResult<ReconcileSummary> {
        let start = Instant::now();

        // A rendition source must be able to cover every requested class;
        // derivation never upscales, so a smaller source would silently
        // produce undersized output.
        if let SourcePreference::Rendition(code) = opts.source {
            let source_class = RenditionClass::by_code(code)?;
            for requested in &opts.sizes {
                if !source_class.covers(requested) {
                    return Err(PipelineError::InvalidSelection(format!(
                        "source rendition '{}' cannot cover class '{}'",
                        source_class.code, requested.code
                    )));
                }
            }
        }

        let ids = self.resolve_ids(selection).await?;
        let workers = opts.workers.max(1);

        info!(
            photos = ids.len(),
            workers,
            dry_run = opts.dry_run,
            force = opts.force,
            "starting reconcile"
        );

        let outcomes: Vec<PhotoOutcome> =
            stream::iter(ids.iter().map(|&id| self.process_photo(id, opts)))
                .buffer_unordered(workers)
                .collect()
                .await;

        let mut summary = ReconcileSummary {
            photos: outcomes.len(),
            ..ReconcileSummary::default()
        };
        for outcome in outcomes {
            summary.generated += outcome.stats.generated;
            summary.skipped += outcome.stats.skipped;
            summary.uploaded += outcome.stats.uploaded;
            summary.fetched += outcome.stats.fetched;
            if outcome.error.is_some() || outcome.stats.class_failures > 0 {
                summary.failed += 1;
                if let Some(err) = outcome.error {
                    warn!(photo_id = outcome.photo_id, error = %err, "photo failed");
                }
            } else {
                summary.succeeded += 1;
            }
        }
        summary.elapsed = start.elapsed();

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            generated = summary.generated,
            uploaded = summary.uploaded,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "reconcile finished"
        );
        Ok(summary)
    }

    async fn process_photo(&self, photo_id: i64, opts: &ReconcileOptions) -> PhotoOutcome {
        let mut stats = PhotoStats::default();
        let error = self
            .process_photo_inner(photo_id, opts, &mut stats)
            .await
            .err();
        PhotoOutcome {
            photo_id,
            stats,
            error,
        }
    }

    async fn process_photo_inner(
        &self,
        photo_id: i64,
        opts: &ReconcileOptions,
        stats: &mut PhotoStats,
    ) -> PipelineResult<()> {
        let photo = self
            .metadata
            .get_photo(photo_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("photo {photo_id}")))?;
        let digest = ContentDigest::from_hex(&photo.digest)?;
        let archive_path = ArchivePath::from_digest(&digest);
        let root = self.archive.root();

        // Decide which classes need work before touching any source.
        let mut pending: Vec<&'static RenditionClass> = Vec::new();
        for class in &opts.sizes {
            let target = archive_path.local_rendition(root, class.code);
            let exists = tokio::fs::try_exists(&target).await.unwrap_or(false);
            if exists && !opts.force {
                stats.skipped += 1;
            } else {
                pending.push(class);
            }
        }

        if pending.is_empty() {
            debug!(photo_id, "nothing to do");
            return Ok(());
        }

        if opts.dry_run {
            // Decision logic only: report what would be generated.
            stats.generated += pending.len() as u64;
            return Ok(());
        }

        let (source, fetched) = self
            .resolve_source(&photo, &archive_path, &pending, opts.source)
            .await?;
        stats.fetched += fetched.len() as u64;

        let derive_opts = DeriveOptions {
            regenerate: opts.force,
            quality: opts.quality,
        };
        for class in pending {
            let status = match derive_rendition(&source, root, &archive_path, class, &derive_opts)
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    warn!(photo_id, class = class.code, error = %e, "derive failed");
                    stats.class_failures += 1;
                    continue;
                }
            };

            if !status.generated() {
                stats.skipped += 1;
                continue;
            }
            stats.generated += 1;

            // Newly generated renditions are published with the ingestion
            // tier policy.
            let key = archive_path.rendition_key(class.code);
            match self
                .publisher
                .publish_file(status.path(), &key, class.tier)
                .await
            {
                Ok(()) => stats.uploaded += 1,
                Err(e) => {
                    warn!(photo_id, class = class.code, error = %e, "upload failed");
                    stats.class_failures += 1;
                }
            }
        }

        if opts.cleanup {
            for path in fetched {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "cleanup failed");
                }
            }
        }

        Ok(())
    }

    /// Find a usable derivation source for the pending classes.
    ///
    /// Prefers the local archived original, then the largest local rendition
    /// whose box covers every pending class, then fetches from the remote
    /// store into the local archive location (recorded for cleanup).
    async fn resolve_source(
        &self,
        photo: &PhotoRow,
        archive_path: &ArchivePath,
        pending: &[&'static RenditionClass],
        preference: SourcePreference,
    ) -> PipelineResult<(PathBuf, Vec<PathBuf>)> {
        let root = self.archive.root();

        if let SourcePreference::Rendition(code) = preference {
            let class = RenditionClass::by_code(code)?;
            let local = archive_path.local_rendition(root, class.code);
            if tokio::fs::try_exists(&local).await.unwrap_or(false) {
                return Ok((local, Vec::new()));
            }
            let fetched = self
                .fetch_remote(&archive_path.rendition_key(class.code), &local)
                .await?;
            return Ok((local, vec![fetched]));
        }

        let original = archive_path.local_original(root, &photo.file_type);
        if tokio::fs::try_exists(&original).await.unwrap_or(false) {
            return Ok((original, Vec::new()));
        }

        // Largest covering local rendition next: best quality among usable
        // local sources.
        let covering: Vec<&'static RenditionClass> = CATALOG
            .iter()
            .filter(|candidate| pending.iter().all(|p| candidate.covers(p)))
            .collect();
        for candidate in covering.iter().rev() {
            let local = archive_path.local_rendition(root, candidate.code);
            if tokio::fs::try_exists(&local).await.unwrap_or(false) {
                return Ok((local, Vec::new()));
            }
        }

        // Nothing local: fetch the original, else the largest covering
        // rendition, from the remote store.
        let original_key = archive_path.original_key(&photo.file_type);
        if let Ok(fetched) = self.fetch_remote(&original_key, &original).await {
            return Ok((original, vec![fetched]));
        }
        for candidate in covering.iter().rev() {
            let local = archive_path.local_rendition(root, candidate.code);
            let key = archive_path.rendition_key(candidate.code);
            if let Ok(fetched) = self.fetch_remote(&key, &local).await {
                return Ok((local, vec![fetched]));
            }
        }

        Err(PipelineError::PreconditionMissing { path: original })
    }

    /// Download a remote artifact to its local archive location.
    async fn fetch_remote(&self, key: &str, local: &PathBuf) -> PipelineResult<PathBuf> {
        let data = self.publisher.store().get(key).await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::CopyFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        // Write through a temp name and rename so an interrupted download
        // never leaves a truncated file at the canonical path, where a later
        // run would take it for a valid artifact.
        let temp = local.with_extension(format!("tmp.{}", Uuid::new_v4()));
        let write_result = match tokio::fs::write(&temp, &data).await {
            Ok(()) => tokio::fs::rename(&temp, local).await,
            Err(e) => Err(e),
        };
        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(PipelineError::CopyFailed {
                path: local.clone(),
                source: e,
            });
        }

        debug!(key, local = %local.display(), "fetched remote artifact");
        Ok(local.clone())
    }

    /// Correct access tiers on already-uploaded artifacts. No re-encode, no
    /// re-upload; objects missing remotely are counted and skipped.
    #[instrument(skip(self, classes))]
    pub async fn update_tiers(
        &self,
        selection: &Selection,
        classes: &[&'static RenditionClass],
        include_original: bool,
        dry_run: bool,
    ) -> PipelineResult<TierUpdateSummary> {
        let start = Instant::now();
        let ids = self.resolve_ids(selection).await?;
        let mut summary = TierUpdateSummary::default();

        for photo_id in ids {
            let Some(photo) = self.metadata.get_photo(photo_id).await? else {
                warn!(photo_id, "unknown photo id in selection");
                summary.failed += 1;
                continue;
            };
            let digest = ContentDigest::from_hex(&photo.digest)?;
            let archive_path = ArchivePath::from_digest(&digest);

            let mut targets: Vec<(String, shoebox_core::Tier)> = Vec::new();
            if include_original {
                targets.push((archive_path.original_key(&photo.file_type), ORIGINAL_TIER));
            }
            for class in classes {
                targets.push((archive_path.rendition_key(class.code), class.tier));
            }

            for (key, tier) in targets {
                summary.examined += 1;
                if dry_run {
                    continue;
                }
                match self.publisher.store().set_tier(&key, tier).await {
                    Ok(()) => summary.updated += 1,
                    Err(shoebox_storage::StorageError::NotFound(_)) => summary.missing += 1,
                    Err(e) => {
                        warn!(key, error = %e, "tier update failed");
                        summary.failed += 1;
                    }
                }
            }
        }

        summary.elapsed = start.elapsed();
        info!(
            examined = summary.examined,
            updated = summary.updated,
            missing = summary.missing,
            failed = summary.failed,
            "tier update finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_ranges() {
        assert_eq!(parse_id_ranges("1,5,10-12").unwrap(), vec![1, 5, 10, 11, 12]);
        assert_eq!(parse_id_ranges("7").unwrap(), vec![7]);
        assert_eq!(parse_id_ranges(" 3 , 4-4 ").unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_parse_id_ranges_rejects_garbage() {
        assert!(parse_id_ranges("").is_err());
        assert!(parse_id_ranges("abc").is_err());
        assert!(parse_id_ranges("9-1").is_err());
        assert!(parse_id_ranges("1,,x").is_err());
    }

    #[test]
    fn test_throughput_is_zero_without_elapsed() {
        let summary = ReconcileSummary::default();
        assert_eq!(summary.throughput(), 0.0);
    }
}
