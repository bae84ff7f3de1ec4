//! End-to-end ingestion tests against a temp archive, a SQLite catalog, and
//! the in-memory object store fake.

mod common;

use common::{write_jpeg, TestPipeline};
use shoebox_core::{ArchivePath, Tier, CATALOG};
use shoebox_pipeline::{IngestOptions, Publisher};
use std::time::Duration;

fn upload_opts() -> IngestOptions {
    IngestOptions {
        upload: true,
        ..IngestOptions::default()
    }
}

#[tokio::test]
async fn test_end_to_end_ingest() {
    let pipeline = TestPipeline::new().await;
    let source = pipeline.import_dir().join("vacation.jpg");
    write_jpeg(&source, 2000, 1500);

    let report = pipeline
        .ingestor
        .ingest_file(&source, &upload_opts())
        .await
        .unwrap();

    assert!(report.newly_cataloged);
    assert!(report.published);

    // Original archived at the digest-derived sharded path.
    let archive_path = ArchivePath::from_digest(&report.digest);
    let expected = archive_path.local_original(pipeline.archive.root(), "jpg");
    assert_eq!(report.archived_path, expected);
    assert!(expected.exists());

    // Full rendition catalog generated beside it.
    assert_eq!(report.renditions.len(), CATALOG.len());
    for outcome in &report.renditions {
        let status = outcome.result.as_ref().unwrap();
        assert!(status.generated());
        assert!(status.path().exists());
    }

    // The largest rendition fits 1024x1024 without distortion.
    let b_path = archive_path.local_rendition(pipeline.archive.root(), "b");
    let b_img = image::open(&b_path).unwrap();
    assert_eq!((b_img.width(), b_img.height()), (1024, 768));

    // Original + 6 renditions remotely, all under the same relative keys.
    assert_eq!(pipeline.store.object_count(), 1 + CATALOG.len());
    assert!(pipeline
        .store
        .keys()
        .contains(&archive_path.original_key("jpg")));

    // Catalog row and ledger agree.
    let photo = pipeline
        .metadata
        .get_photo(report.photo_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(photo.digest, report.digest.to_hex());
    assert!(pipeline.metadata.is_published(report.photo_id).await.unwrap());

    // The ledger answers by digest on its own, without the photo id.
    assert!(pipeline
        .metadata
        .is_published_by_digest(&report.digest.to_hex())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_tier_policy_applied_on_upload() {
    let pipeline = TestPipeline::new().await;
    let source = pipeline.import_dir().join("photo.jpg");
    write_jpeg(&source, 1200, 900);

    let report = pipeline
        .ingestor
        .ingest_file(&source, &upload_opts())
        .await
        .unwrap();
    let archive_path = ArchivePath::from_digest(&report.digest);

    // Original restricted, small gallery classes public, large restricted.
    assert_eq!(
        pipeline.store.tier_of(&archive_path.original_key("jpg")),
        Some(Tier::Restricted)
    );
    for code in ["t", "m", "n"] {
        assert_eq!(
            pipeline.store.tier_of(&archive_path.rendition_key(code)),
            Some(Tier::Public),
            "class {code}"
        );
    }
    for code in ["k", "c", "b"] {
        assert_eq!(
            pipeline.store.tier_of(&archive_path.rendition_key(code)),
            Some(Tier::Restricted),
            "class {code}"
        );
    }

    // Renditions are uploaded as JPEG regardless of original format.
    assert_eq!(
        pipeline
            .store
            .content_type_of(&archive_path.rendition_key("t")),
        Some("image/jpeg".to_string())
    );
}

#[tokio::test]
async fn test_duplicate_content_reuses_catalog_entry() {
    let pipeline = TestPipeline::new().await;
    let first = pipeline.import_dir().join("original.jpg");
    write_jpeg(&first, 800, 600);
    let second = pipeline.import_dir().join("copy-from-phone.jpg");
    std::fs::copy(&first, &second).unwrap();

    let report_a = pipeline
        .ingestor
        .ingest_file(&first, &upload_opts())
        .await
        .unwrap();
    let report_b = pipeline
        .ingestor
        .ingest_file(&second, &upload_opts())
        .await
        .unwrap();

    assert!(report_a.newly_cataloged);
    assert!(!report_b.newly_cataloged);
    assert_eq!(report_a.photo_id, report_b.photo_id);
    assert_eq!(report_a.digest, report_b.digest);

    // One artifact set, not two.
    assert_eq!(pipeline.store.object_count(), 1 + CATALOG.len());

    // First import's provenance wins.
    let import = pipeline
        .metadata
        .get_import(report_a.photo_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(import.import_path, first.to_string_lossy());
}

#[tokio::test]
async fn test_partial_upload_leaves_ledger_unpublished() {
    let pipeline = TestPipeline::new().await;
    let source = pipeline.import_dir().join("flaky.jpg");
    write_jpeg(&source, 900, 900);

    let digest = pipeline.archive.digest_file(&source).await.unwrap();
    let archive_path = ArchivePath::from_digest(&digest);
    pipeline
        .store
        .fail_put(&archive_path.rendition_key("b"));

    let report = pipeline
        .ingestor
        .ingest_file(&source, &upload_opts())
        .await
        .unwrap();

    assert!(!report.published);
    let failures: Vec<_> = report
        .uploads
        .iter()
        .filter(|u| u.result.is_err())
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].key, archive_path.rendition_key("b"));
    assert!(!pipeline.metadata.is_published(report.photo_id).await.unwrap());

    // Retry after the failure clears completes and flips the ledger.
    pipeline.store.clear_failures();
    let retry = pipeline
        .ingestor
        .ingest_file(&source, &upload_opts())
        .await
        .unwrap();
    assert!(retry.published);
    assert!(pipeline.metadata.is_published(retry.photo_id).await.unwrap());
}

#[tokio::test]
async fn test_already_published_skips_uploads() {
    let pipeline = TestPipeline::new().await;
    let source = pipeline.import_dir().join("stable.jpg");
    write_jpeg(&source, 700, 500);

    let first = pipeline
        .ingestor
        .ingest_file(&source, &upload_opts())
        .await
        .unwrap();
    assert!(first.published);
    assert!(!first.uploads.is_empty());

    let second = pipeline
        .ingestor
        .ingest_file(&source, &upload_opts())
        .await
        .unwrap();
    assert!(second.published);
    assert!(second.uploads.is_empty());
}

#[tokio::test]
async fn test_ingest_without_upload_stays_local() {
    let pipeline = TestPipeline::new().await;
    let source = pipeline.import_dir().join("local-only.jpg");
    write_jpeg(&source, 640, 480);

    let report = pipeline
        .ingestor
        .ingest_file(&source, &IngestOptions::default())
        .await
        .unwrap();

    assert!(!report.published);
    assert!(report.uploads.is_empty());
    assert_eq!(pipeline.store.object_count(), 0);

    // Local archive and renditions exist regardless.
    assert!(report.archived_path.exists());
    for outcome in &report.renditions {
        assert!(outcome.result.as_ref().unwrap().path().exists());
    }
}

#[tokio::test]
async fn test_signed_url_defaults_to_one_hour() {
    let pipeline = TestPipeline::new().await;
    let source = pipeline.import_dir().join("private.jpg");
    write_jpeg(&source, 600, 400);

    let report = pipeline
        .ingestor
        .ingest_file(&source, &upload_opts())
        .await
        .unwrap();
    let archive_path = ArchivePath::from_digest(&report.digest);
    let key = archive_path.rendition_key("b");

    let publisher = Publisher::new(pipeline.store.clone());
    let url = publisher.signed_url(&key, None).await.unwrap();
    assert_eq!(url, format!("memory://{key}?expires=3600"));

    let url = publisher
        .signed_url(&key, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(url, format!("memory://{key}?expires=60"));
}

#[tokio::test]
async fn test_reingest_skips_existing_renditions() {
    let pipeline = TestPipeline::new().await;
    let source = pipeline.import_dir().join("twice.jpg");
    write_jpeg(&source, 640, 480);

    pipeline
        .ingestor
        .ingest_file(&source, &IngestOptions::default())
        .await
        .unwrap();
    let second = pipeline
        .ingestor
        .ingest_file(&source, &IngestOptions::default())
        .await
        .unwrap();

    for outcome in &second.renditions {
        assert!(
            !outcome.result.as_ref().unwrap().generated(),
            "class {} should have been skipped",
            outcome.class.code
        );
    }
}
