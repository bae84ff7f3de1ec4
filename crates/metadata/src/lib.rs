//! Catalog and publication ledger for Shoebox.
//!
//! This crate provides the control-plane data model:
//! - The photo catalog keyed by content digest
//! - Import provenance (path, source batch, file date)
//! - The publication ledger tracking which photos reached remote storage

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{ImportRow, PhotoRow};
pub use repos::{ImportRepo, NewPhoto, PhotoRepo};
pub use store::{MetadataStore, SqliteStore};

use shoebox_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(&config.path).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
