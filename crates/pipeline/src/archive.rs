//! Local sharded archive store.

use crate::error::{PipelineError, PipelineResult};
use shoebox_core::{ArchivePath, ContentDigest, DIGEST_BLOCK_SIZE};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use uuid::Uuid;

/// The content-addressed archive rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The archive root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the content digest of a file by streaming it through the
    /// hasher in fixed-size blocks. No partial digest escapes on error.
    #[instrument(skip(self))]
    pub async fn digest_file(&self, path: &Path) -> PipelineResult<ContentDigest> {
        let path_owned = path.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || -> std::io::Result<ContentDigest> {
            let mut file = std::fs::File::open(&path_owned)?;
            let mut hasher = ContentDigest::hasher();
            let mut buf = vec![0u8; DIGEST_BLOCK_SIZE];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hasher.finalize())
        })
        .await
        .map_err(|e| PipelineError::SourceUnreadable {
            path: path.to_path_buf(),
            message: format!("digest task failed: {e}"),
        })?
        .map_err(|e| PipelineError::SourceUnreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(digest)
    }

    /// Copy a source file into its archive location.
    ///
    /// Idempotent: when the target already exists its content is the same
    /// bytes (the path embeds the digest), so it is returned untouched. The
    /// second tuple element is true when this call copied the file.
    #[instrument(skip(self, archive_path), fields(archive_path = %archive_path))]
    pub async fn archive_original(
        &self,
        source: &Path,
        archive_path: &ArchivePath,
        file_type: &str,
    ) -> PipelineResult<(PathBuf, bool)> {
        let target = archive_path.local_original(&self.root, file_type);

        if tokio::fs::try_exists(&target)
            .await
            .map_err(|e| copy_failed(&target, e))?
        {
            debug!(target = %target.display(), "original already archived");
            return Ok((target, false));
        }

        let shard_dir = archive_path.shard_dir(&self.root);
        tokio::fs::create_dir_all(&shard_dir)
            .await
            .map_err(|e| copy_failed(&shard_dir, e))?;

        // Copy through a temp name and rename so a crash mid-copy never
        // leaves a partial file at the canonical path.
        let temp_path = shard_dir.join(format!(".tmp.{}", Uuid::new_v4()));
        tokio::fs::copy(source, &temp_path)
            .await
            .map_err(|e| copy_failed(&temp_path, e))?;
        if let Err(e) = tokio::fs::rename(&temp_path, &target).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(copy_failed(&target, e));
        }

        debug!(target = %target.display(), "archived original");
        Ok((target, true))
    }
}

fn copy_failed(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::CopyFailed {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_for(dir: &tempfile::TempDir) -> LocalArchive {
        LocalArchive::new(dir.path().join("archive"))
    }

    #[tokio::test]
    async fn test_digest_file_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("hello.txt");
        std::fs::write(&source, b"hello world").unwrap();

        let archive = archive_for(&dir);
        let digest = archive.digest_file(&source).await.unwrap();
        assert_eq!(digest.to_hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[tokio::test]
    async fn test_digest_file_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_for(&dir);

        let err = archive
            .digest_file(&dir.path().join("nope.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_archive_original_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        let archive = archive_for(&dir);
        let digest = archive.digest_file(&source).await.unwrap();
        let path = ArchivePath::from_digest(&digest);

        let (first, copied) = archive
            .archive_original(&source, &path, "jpg")
            .await
            .unwrap();
        assert!(copied);
        assert_eq!(std::fs::read(&first).unwrap(), b"jpeg bytes");

        // Second archival of the same content leaves the file untouched.
        let before = std::fs::metadata(&first).unwrap().modified().unwrap();
        let (second, copied) = archive
            .archive_original(&source, &path, "jpg")
            .await
            .unwrap();
        assert!(!copied);
        assert_eq!(first, second);
        let after = std::fs::metadata(&second).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_archive_original_missing_source_is_copy_failed() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_for(&dir);
        let digest = ContentDigest::compute(b"whatever");
        let path = ArchivePath::from_digest(&digest);

        let err = archive
            .archive_original(&dir.path().join("gone.jpg"), &path, "jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CopyFailed { .. }));
    }
}
