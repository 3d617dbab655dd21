//! The record type that flows through every pipeline stage.

use serde::Serialize;

/// A single region of a file moving through the upload pipeline.
///
/// A chunk starts life as a bare plan (number, offset, size) from the
/// planner and is enriched as it flows downstream: the reader fills
/// `data`, the hasher sets `hash`, and the naming stages assign `object`
/// and `container`. Uploaders clear `data` once the bytes are stored so
/// that whole-file content is never resident.
///
/// Manifest-building stages reuse the same type for manifests: `number`
/// becomes the manifest ordinal, `data` the manifest JSON, `size` the
/// apparent size (sum of the referenced chunk sizes), and `hash` the SLO
/// manifest ETag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based ordinal of this chunk within its upload.
    pub number: u64,
    /// Name this chunk will bear within object storage.
    pub object: String,
    /// Object storage container this chunk will be uploaded into.
    pub container: String,
    /// Hex MD5 digest of the chunk's content.
    pub hash: String,
    /// Content of the file region, `size` bytes once read.
    pub data: Vec<u8>,
    /// Length in bytes of the file region.
    pub size: u64,
    /// Index of the first byte of the region within the file.
    pub offset: u64,
}

impl Chunk {
    /// The `container/object` path this chunk occupies in object storage.
    pub fn path(&self) -> String {
        format!("{}/{}", self.container, self.object)
    }

    /// Whether every field an upload needs is populated.
    pub fn upload_ready(&self) -> bool {
        self.size >= 1
            && self.data.len() as u64 == self.size
            && !self.object.is_empty()
            && !self.container.is_empty()
            && !self.hash.is_empty()
    }
}

/// One entry of an SLO manifest body, serialized exactly as the store
/// expects it: `{"path":"<container>/<object>","etag":"<hash>","size_bytes":<size>}`.
#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    path: String,
    etag: String,
    size_bytes: u64,
}

impl From<&Chunk> for ManifestEntry {
    fn from(chunk: &Chunk) -> Self {
        Self {
            path: chunk.path(),
            etag: chunk.hash.clone(),
            size_bytes: chunk.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_joins_container_and_object() {
        let chunk = Chunk {
            container: "container".to_string(),
            object: "object-chunk-0000-size-10".to_string(),
            ..Chunk::default()
        };
        assert_eq!(chunk.path(), "container/object-chunk-0000-size-10");
    }

    #[test]
    fn test_upload_ready_requires_every_field() {
        let complete = Chunk {
            number: 0,
            object: "object".to_string(),
            container: "container".to_string(),
            hash: "abcd".to_string(),
            data: vec![0u8; 4],
            size: 4,
            offset: 0,
        };
        assert!(complete.upload_ready());

        for missing in [
            Chunk { size: 0, ..complete.clone() },
            Chunk { data: Vec::new(), ..complete.clone() },
            Chunk { object: String::new(), ..complete.clone() },
            Chunk { container: String::new(), ..complete.clone() },
            Chunk { hash: String::new(), ..complete.clone() },
        ] {
            assert!(!missing.upload_ready(), "{missing:?} should not be ready");
        }
    }

    #[test]
    fn test_manifest_entry_wire_format() {
        let chunk = Chunk {
            container: "container".to_string(),
            object: "object".to_string(),
            hash: "0123abcd".to_string(),
            size: 1024,
            ..Chunk::default()
        };
        let json: String = serde_json::to_string(&ManifestEntry::from(&chunk)).unwrap();
        assert_eq!(
            json,
            r#"{"path":"container/object","etag":"0123abcd","size_bytes":1024}"#
        );
    }
}
