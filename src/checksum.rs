//! Snapshot digests
//!
//! Byte-identical snapshots are the common case across patch releases; a
//! SHA-256 digest lets the selector and the store recognise them without
//! parsing.

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 checksum of raw snapshot bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::from_bytes(data) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = b"openapi: 3.0.2\npaths: {}\n";
        assert_eq!(Checksum::from_bytes(content), Checksum::from_bytes(content));
        assert_eq!(Checksum::from_bytes(content).as_str().len(), 64);
    }

    #[test]
    fn test_checksum_verification() {
        let checksum = Checksum::from_bytes(b"paths: {}");
        assert!(checksum.verify(b"paths: {}"));
        assert!(!checksum.verify(b"paths: {} "));
    }
}
