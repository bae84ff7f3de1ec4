//! Content digest types and utilities.
//!
//! A photo's identity is the SHA-1 digest of its raw bytes. The digest width
//! (160 bits) and hex encoding are storage format constants: the sharded
//! archive layout is carved out of the hex string, so changing either would
//! invalidate every existing archive entry.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// A SHA-1 content digest represented as 20 bytes.
///
/// Two byte-identical inputs always produce the same digest regardless of
/// filename, upload time, or client. Immutable once computed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest([u8; 20]);

impl ContentDigest {
    /// Create a ContentDigest from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Compute the digest of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher for streaming input.
    pub fn hasher() -> DigestHasher {
        DigestHasher(Sha1::new())
    }

    /// Parse from a 40-character lowercase hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 40 {
            return Err(crate::Error::InvalidDigest(format!(
                "expected 40 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk)
                .map_err(|e| crate::Error::InvalidDigest(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidDigest(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental SHA-1 hasher.
pub struct DigestHasher(Sha1);

impl DigestHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> ContentDigest {
        ContentDigest(self.0.finalize().into())
    }
}
