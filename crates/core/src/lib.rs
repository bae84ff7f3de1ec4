//! Core domain types and shared logic for the Shoebox photo archive.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content digests (the only basis for photo identity)
//! - The sharded archive path scheme derived from a digest
//! - The rendition catalog and access tiers
//! - Configuration types

pub mod archive_path;
pub mod config;
pub mod digest;
pub mod error;
pub mod rendition;

pub use archive_path::ArchivePath;
pub use digest::{ContentDigest, DigestHasher};
pub use error::{Error, Result};
pub use rendition::{RenditionClass, Tier, CATALOG, NORMALIZED_EXT};

/// Block size for streaming content through the hasher: 64 KiB.
pub const DIGEST_BLOCK_SIZE: usize = 64 * 1024;

/// Default JPEG quality for normalized rendition output.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Default expiry for signed URLs on restricted artifacts: one hour.
pub const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 3600;
