//! The sharded archive path scheme.
//!
//! A digest maps deterministically to a three-level directory prefix plus a
//! canonical base filename: the first six hex characters become `aa/bb/cc`
//! and the remaining 34 become the stem. This bounds per-directory fan-out
//! to an even spread over 65,536 second-level buckets, and is a storage
//! format constant: changing it without a migration orphans every archived
//! original.
//!
//! The same relative key is used on local disk (under the archive root) and
//! as the remote object key, so the two layouts are isomorphic.

use crate::digest::ContentDigest;
use crate::rendition::NORMALIZED_EXT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The archive location derived from a content digest.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchivePath {
    /// Three-level shard prefix, e.g. `2a/ae/6c`.
    shard: String,
    /// Remaining 34 hex characters of the digest.
    stem: String,
}

impl ArchivePath {
    /// Derive the archive path for a digest. Pure, no I/O.
    pub fn from_digest(digest: &ContentDigest) -> Self {
        let hex = digest.to_hex();
        Self {
            shard: format!("{}/{}/{}", &hex[0..2], &hex[2..4], &hex[4..6]),
            stem: hex[6..].to_string(),
        }
    }

    /// The shard directory, relative to the archive root.
    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// The canonical base filename (without extension or size code).
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Relative key of the archived original: `aa/bb/cc/<stem>.<ext>`.
    pub fn original_key(&self, file_type: &str) -> String {
        format!("{}/{}.{}", self.shard, self.stem, file_type)
    }

    /// Relative key of a rendition: `aa/bb/cc/<stem>_<code>.jpg`.
    ///
    /// Renditions always carry the normalized extension regardless of the
    /// original's format.
    pub fn rendition_key(&self, code: &str) -> String {
        format!("{}/{}_{}.{}", self.shard, self.stem, code, NORMALIZED_EXT)
    }

    /// Absolute shard directory under an archive root.
    pub fn shard_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.shard)
    }

    /// Absolute path of the archived original under an archive root.
    pub fn local_original(&self, root: &Path, file_type: &str) -> PathBuf {
        root.join(self.original_key(file_type))
    }

    /// Absolute path of a rendition under an archive root.
    pub fn local_rendition(&self, root: &Path, code: &str) -> PathBuf {
        root.join(self.rendition_key(code))
    }
}

impl fmt::Debug for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchivePath({}/{})", self.shard, self.stem)
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard, self.stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> ContentDigest {
        // SHA-1 of "hello world"
        ContentDigest::from_hex("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed").unwrap()
    }

    #[test]
    fn test_sharding_is_stable() {
        // These exact values are a storage format constant. If this test
        // breaks, every deployed archive needs a migration.
        let path = ArchivePath::from_digest(&digest());
        assert_eq!(path.shard(), "2a/ae/6c");
        assert_eq!(path.stem(), "35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_original_key() {
        let path = ArchivePath::from_digest(&digest());
        assert_eq!(
            path.original_key("png"),
            "2a/ae/6c/35c94fcfb415dbe95f408b9ce91ee846ed.png"
        );
    }

    #[test]
    fn test_rendition_key_normalizes_extension() {
        let path = ArchivePath::from_digest(&digest());
        // A PNG original still gets .jpg renditions.
        assert_eq!(
            path.rendition_key("t"),
            "2a/ae/6c/35c94fcfb415dbe95f408b9ce91ee846ed_t.jpg"
        );
    }

    #[test]
    fn test_local_paths_mirror_keys() {
        let path = ArchivePath::from_digest(&digest());
        let root = Path::new("/archive");
        assert_eq!(
            path.local_original(root, "jpg"),
            PathBuf::from("/archive/2a/ae/6c/35c94fcfb415dbe95f408b9ce91ee846ed.jpg")
        );
        assert_eq!(
            path.local_rendition(root, "b"),
            PathBuf::from("/archive/2a/ae/6c/35c94fcfb415dbe95f408b9ce91ee846ed_b.jpg")
        );
    }

    #[test]
    fn test_same_bytes_same_path() {
        let a = ArchivePath::from_digest(&ContentDigest::compute(b"identical"));
        let b = ArchivePath::from_digest(&ContentDigest::compute(b"identical"));
        assert_eq!(a, b);
    }
}
