//! MD5 digest helpers.
//!
//! Swift identifies every object by the MD5 of its contents, and SLO
//! manifests derive their ETag from chunk digests, so all hashing in this
//! workspace goes through these helpers.

use md5::{Digest, Md5};

/// Compute the MD5 digest of a byte slice.
///
/// # Arguments
/// * `data` - Bytes to hash
///
/// # Returns
/// 32-character lowercase hex string (128 bits).
pub fn hash_bytes(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    hex::encode(digest)
}

/// Streaming hasher for incremental MD5 hashing.
///
/// Use this when you need to hash data incrementally, such as when
/// computing a digest while uploading without holding the data in memory.
pub struct Md5Hasher {
    inner: Md5,
}

impl Md5Hasher {
    /// Create a new streaming hasher.
    pub fn new() -> Self {
        Self { inner: Md5::new() }
    }

    /// Update the hasher with additional data.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Discard any accumulated state, as if freshly created.
    pub fn reset(&mut self) {
        self.inner = Md5::new();
    }

    /// Finalize and return the digest as a 32-char hex string.
    pub fn finish_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_empty() {
        assert_eq!(hash_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_hash_bytes_known_vector() {
        assert_eq!(
            hash_bytes(b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_hash_bytes_different_inputs() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn test_md5_hasher_incremental() {
        let mut hasher: Md5Hasher = Md5Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finish_hex(), hash_bytes(b"hello world"));
    }

    #[test]
    fn test_md5_hasher_reset() {
        let mut hasher: Md5Hasher = Md5Hasher::new();
        hasher.update(b"garbage from a failed attempt");
        hasher.reset();
        hasher.update(b"hello world");
        assert_eq!(hasher.finish_hex(), hash_bytes(b"hello world"));
    }
}
