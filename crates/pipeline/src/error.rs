//! Pipeline error types.
//!
//! The taxonomy distinguishes failures that are fatal to a whole item
//! (unreadable source, failed archive copy) from failures local to a single
//! rendition or upload, which are recorded and never abort sibling work.

use shoebox_metadata::MetadataError;
use shoebox_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline operation errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source bytes could not be read or decoded. Fatal to the item.
    #[error("cannot read source {path}: {message}")]
    SourceUnreadable { path: PathBuf, message: String },

    /// Copy into the local archive failed. Fatal to the item.
    #[error("archive copy to {path} failed: {source}")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single rendition class failed to generate. Siblings continue.
    #[error("rendition '{class}' failed to encode: {message}")]
    EncodeFailed { class: &'static str, message: String },

    /// A single artifact failed to publish. The ledger stays unpublished.
    #[error("upload of {key} failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: StorageError,
    },

    /// A local file expected before upload is absent or empty. Distinct from
    /// [`UploadFailed`] so operators can tell "never generated" from
    /// "generated but network failed".
    ///
    /// [`UploadFailed`]: PipelineError::UploadFailed
    #[error("expected local file missing or empty: {path}")]
    PreconditionMissing { path: PathBuf },

    /// A photo id selection could not be parsed.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] shoebox_core::Error),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
