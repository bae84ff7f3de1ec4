//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local archive settings.
    pub archive: ArchiveConfig,
    /// Remote object store backend.
    pub storage: StorageConfig,
    /// Metadata database settings.
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.archive.root.as_os_str().is_empty() {
            return Err(crate::Error::Config(
                "archive.root must not be empty".to_string(),
            ));
        }
        self.storage.validate()?;
        Ok(())
    }
}

/// Local sharded archive settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Root directory of the sharded archive.
    pub root: PathBuf,
    /// JPEG quality for rendition output (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_jpeg_quality() -> u8 {
    crate::DEFAULT_JPEG_QUALITY
}

/// Metadata database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Remote object store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem store (development and tests).
    Filesystem {
        /// Root directory for stored objects.
        path: PathBuf,
    },
    /// S3-compatible object store.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region (defaults to us-east-1).
        region: Option<String>,
        /// Optional key prefix within the bucket.
        prefix: Option<String>,
        /// Explicit access key id. When unset, the ambient AWS credential
        /// chain is used.
        access_key_id: Option<String>,
        /// Explicit secret access key. Must be paired with access_key_id.
        secret_access_key: Option<String>,
        /// Use path-style URLs (required for MinIO and some S3-compatibles).
        #[serde(default)]
        force_path_style: bool,
    },
}

impl StorageConfig {
    /// Validate backend-specific settings.
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            StorageConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err(crate::Error::Config(
                        "filesystem storage path must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err(crate::Error::Config(
                        "s3 bucket must not be empty".to_string(),
                    ));
                }
                if access_key_id.is_some() ^ secret_access_key.is_some() {
                    return Err(crate::Error::Config(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}
