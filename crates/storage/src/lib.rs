//! Remote object store abstraction and backends for Shoebox.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait used by the publication pipeline
//! - Access-tier aware puts (public renditions vs restricted artifacts)
//! - Backends: S3-compatible services and the local filesystem

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ObjectMeta, ObjectStore, PutOptions};

use shoebox_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config
        .validate()
        .map_err(|e| StorageError::Config(e.to_string()))?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use shoebox_core::config::StorageConfig;
    use shoebox_core::Tier;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
        };

        let store = from_config(&config).await.unwrap();
        store
            .put(
                "2a/ae/6c/photo.jpg",
                Bytes::from_static(b"jpeg"),
                PutOptions {
                    content_type: "image/jpeg",
                    tier: Tier::Public,
                },
            )
            .await
            .unwrap();
        assert!(store.exists("2a/ae/6c/photo.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn from_config_s3_ok() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: Some("minio:9000".to_string()),
            region: Some("us-east-1".to_string()),
            prefix: Some("photos".to_string()),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: true,
        };

        let store = from_config(&config).await.unwrap();
        drop(store);
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
