//! Remote publisher: pushes archived artifacts to the object store.

use crate::error::{PipelineError, PipelineResult};
use bytes::Bytes;
use shoebox_core::rendition::{content_type_for, file_type_from_name};
use shoebox_core::{Tier, DEFAULT_SIGNED_URL_EXPIRY_SECS};
use shoebox_storage::{ObjectStore, PutOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Access tier applied to archived originals. Full-size imagery is always
/// restricted; only the small gallery renditions are public.
pub const ORIGINAL_TIER: Tier = Tier::Restricted;

/// Publishes local artifacts to the remote store at their archive keys.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The underlying object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload one local file to `key` with the tier's access policy.
    ///
    /// The local file must exist and be non-empty before the transfer starts;
    /// a missing or empty file is a [`PipelineError::PreconditionMissing`],
    /// not an upload failure. A single put, no internal retries.
    #[instrument(skip(self, local), fields(backend = self.store.backend_name()))]
    pub async fn publish_file(&self, local: &Path, key: &str, tier: Tier) -> PipelineResult<()> {
        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|_| PipelineError::PreconditionMissing {
                path: local.to_path_buf(),
            })?;
        if metadata.len() == 0 {
            return Err(PipelineError::PreconditionMissing {
                path: local.to_path_buf(),
            });
        }

        let content_type = file_type_from_name(key)
            .as_deref()
            .map(content_type_for)
            .unwrap_or("application/octet-stream");

        let data =
            tokio::fs::read(local)
                .await
                .map(Bytes::from)
                .map_err(|e| PipelineError::SourceUnreadable {
                    path: local.to_path_buf(),
                    message: e.to_string(),
                })?;

        self.store
            .put(key, data, PutOptions { content_type, tier })
            .await
            .map_err(|source| PipelineError::UploadFailed {
                key: key.to_string(),
                source,
            })?;

        debug!(key, %tier, "published artifact");
        Ok(())
    }

    /// Whether an object already exists at `key` remotely.
    pub async fn exists(&self, key: &str) -> PipelineResult<bool> {
        Ok(self.store.exists(key).await?)
    }

    /// Time-limited read URL for a restricted artifact. Defaults to one hour.
    pub async fn signed_url(&self, key: &str, expiry: Option<Duration>) -> PipelineResult<String> {
        let expiry = expiry.unwrap_or(Duration::from_secs(DEFAULT_SIGNED_URL_EXPIRY_SECS));
        Ok(self.store.signed_url(key, expiry).await?)
    }
}
