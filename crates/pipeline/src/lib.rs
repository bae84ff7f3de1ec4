//! Archival, derivative, and publication pipeline for Shoebox.
//!
//! Control flow for one ingested file:
//! digest → catalog (insert-or-fetch) → local archive copy → rendition
//! catalog derivation → remote publish → publication ledger. The batch
//! reconciler re-enters at the derive/publish stages to close gaps in
//! existing archives.

pub mod archive;
pub mod derive;
pub mod error;
pub mod ingest;
pub mod publish;
pub mod reconcile;

pub use archive::LocalArchive;
pub use derive::{derive_all, derive_rendition, DeriveOptions, DeriveStatus, RenditionOutcome};
pub use error::{PipelineError, PipelineResult};
pub use ingest::{IngestOptions, IngestReport, Ingestor, UploadOutcome};
pub use publish::{Publisher, ORIGINAL_TIER};
pub use reconcile::{
    parse_id_ranges, ReconcileOptions, ReconcileSummary, Reconciler, Selection, SourcePreference,
    TierUpdateSummary,
};
