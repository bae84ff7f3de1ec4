//! Shared test fixtures for pipeline integration tests.

pub mod memory;

use memory::MemoryStore;
use shoebox_metadata::{MetadataStore, SqliteStore};
use shoebox_pipeline::{Ingestor, LocalArchive, Publisher, Reconciler};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A full pipeline wired to a temp archive, a SQLite file, and the in-memory
/// object store fake.
pub struct TestPipeline {
    pub dir: tempfile::TempDir,
    pub archive: LocalArchive,
    pub store: Arc<MemoryStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub ingestor: Ingestor,
    pub reconciler: Reconciler,
}

impl TestPipeline {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let archive = LocalArchive::new(dir.path().join("archive"));
        let store = Arc::new(MemoryStore::new());
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(dir.path().join("catalog.db"))
                .await
                .unwrap(),
        );

        let publisher = Publisher::new(store.clone());
        let ingestor = Ingestor::new(
            archive.clone(),
            publisher.clone(),
            metadata.clone(),
            shoebox_core::DEFAULT_JPEG_QUALITY,
        );
        let reconciler = Reconciler::new(archive.clone(), publisher, metadata.clone());

        Self {
            dir,
            archive,
            store,
            metadata,
            ingestor,
            reconciler,
        }
    }

    /// Directory for import source files, outside the archive root.
    pub fn import_dir(&self) -> PathBuf {
        let path = self.dir.path().join("import");
        std::fs::create_dir_all(&path).unwrap();
        path
    }
}

/// Write a deterministic gradient JPEG of the given dimensions.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save(path).unwrap();
}
