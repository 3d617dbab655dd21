//! In-memory destinations for exercising upload pipelines without a
//! running object store.
//!
//! [`BufferDestination`] records everything it receives for later
//! inspection, [`NullDestination`] accepts and discards everything, and
//! [`ErrorDestination`] fails every call. All three satisfy the full
//! [`Destination`] contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use swiftslo_common::hash_bytes;

use crate::destination::{Destination, ObjectRecord, ObjectWriter};
use crate::error::DestinationError;

/// A recorded SLO manifest upload.
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    /// Container the manifest was created in.
    pub container: String,
    /// Manifest object name.
    pub name: String,
    /// ETag the uploader supplied.
    pub etag: String,
    /// Raw manifest JSON body.
    pub json: Vec<u8>,
}

#[derive(Default)]
struct BufferState {
    containers: HashMap<String, Vec<ObjectRecord>>,
    contents: HashMap<String, Vec<u8>>,
    manifests: Vec<ManifestRecord>,
}

impl BufferState {
    fn record_object(&mut self, container: &str, record: ObjectRecord) {
        let records = self.containers.entry(container.to_string()).or_default();
        match records.iter_mut().find(|existing| existing.name == record.name) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }
}

/// Destination that keeps the observed container names, object bytes, and
/// manifest bodies for later retrieval by tests.
#[derive(Default, Clone)]
pub struct BufferDestination {
    state: Arc<Mutex<BufferState>>,
}

impl BufferDestination {
    /// Create a new, empty buffer destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an object listing entry so that resume logic sees the
    /// object as already uploaded.
    pub fn seed_object(&self, container: &str, name: &str, hash: &str, bytes: u64) {
        let mut state = self.state.lock().unwrap();
        state.record_object(
            container,
            ObjectRecord {
                name: name.to_string(),
                hash: hash.to_string(),
                bytes,
            },
        );
    }

    /// The bytes captured for one uploaded object, if it was uploaded.
    pub fn object_content(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.contents.get(&format!("{container}/{name}")).cloned()
    }

    /// Names of every object recorded in a container, sorted.
    pub fn object_names(&self, container: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .containers
            .get(container)
            .map(|records| records.iter().map(|record| record.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Concatenation of all captured object bytes in a container, in
    /// object-name order. Chunk names zero-pad their number, so name order
    /// is chunk order.
    pub fn captured_bytes(&self, container: &str) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<&String> = state
            .contents
            .keys()
            .filter(|key| key.starts_with(&format!("{container}/")))
            .collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|key| state.contents[key].iter().copied())
            .collect()
    }

    /// Every manifest uploaded through `create_slo`, in upload order.
    pub fn manifests(&self) -> Vec<ManifestRecord> {
        self.state.lock().unwrap().manifests.clone()
    }
}

#[async_trait]
impl Destination for BufferDestination {
    async fn create_file(
        &self,
        container: &str,
        object: &str,
        check_hash: bool,
        hash: &str,
    ) -> Result<Box<dyn ObjectWriter>, DestinationError> {
        Ok(Box::new(BufferWriter {
            state: Arc::clone(&self.state),
            container: container.to_string(),
            object: object.to_string(),
            check_hash,
            expected_hash: hash.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn create_slo(
        &self,
        container: &str,
        manifest_name: &str,
        manifest_etag: &str,
        manifest_json: &[u8],
    ) -> Result<(), DestinationError> {
        let mut state = self.state.lock().unwrap();
        state.record_object(
            container,
            ObjectRecord {
                name: manifest_name.to_string(),
                hash: manifest_etag.to_string(),
                bytes: manifest_json.len() as u64,
            },
        );
        state.manifests.push(ManifestRecord {
            container: container.to_string(),
            name: manifest_name.to_string(),
            etag: manifest_etag.to_string(),
            json: manifest_json.to_vec(),
        });
        Ok(())
    }

    async fn create_dlo(
        &self,
        manifest_container: &str,
        manifest_name: &str,
        _object_container: &str,
        _prefix: &str,
    ) -> Result<(), DestinationError> {
        let mut state = self.state.lock().unwrap();
        state.record_object(
            manifest_container,
            ObjectRecord {
                name: manifest_name.to_string(),
                hash: String::new(),
                bytes: 0,
            },
        );
        Ok(())
    }

    async fn objects(&self, container: &str) -> Result<Vec<ObjectRecord>, DestinationError> {
        let state = self.state.lock().unwrap();
        Ok(state.containers.get(container).cloned().unwrap_or_default())
    }
}

/// Buffers written bytes and records them into the shared state on close.
struct BufferWriter {
    state: Arc<Mutex<BufferState>>,
    container: String,
    object: String,
    check_hash: bool,
    expected_hash: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for BufferWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, DestinationError> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn close(self: Box<Self>) -> Result<(), DestinationError> {
        let writer: BufferWriter = *self;
        let hash: String = hash_bytes(&writer.buffer);
        if writer.check_hash && !writer.expected_hash.is_empty() && writer.expected_hash != hash {
            return Err(DestinationError::HashMismatch {
                object: writer.object,
                expected: writer.expected_hash,
                actual: hash,
            });
        }
        let mut state = writer.state.lock().unwrap();
        let bytes: u64 = writer.buffer.len() as u64;
        state
            .contents
            .insert(format!("{}/{}", writer.container, writer.object), writer.buffer);
        state.record_object(
            &writer.container,
            ObjectRecord {
                name: writer.object,
                hash,
                bytes,
            },
        );
        Ok(())
    }
}

/// Destination that accepts every operation and records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDestination;

struct NullWriter;

#[async_trait]
impl ObjectWriter for NullWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, DestinationError> {
        Ok(buf.len())
    }

    async fn close(self: Box<Self>) -> Result<(), DestinationError> {
        Ok(())
    }
}

#[async_trait]
impl Destination for NullDestination {
    async fn create_file(
        &self,
        _container: &str,
        _object: &str,
        _check_hash: bool,
        _hash: &str,
    ) -> Result<Box<dyn ObjectWriter>, DestinationError> {
        Ok(Box::new(NullWriter))
    }

    async fn create_slo(
        &self,
        _container: &str,
        _manifest_name: &str,
        _manifest_etag: &str,
        _manifest_json: &[u8],
    ) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn create_dlo(
        &self,
        _manifest_container: &str,
        _manifest_name: &str,
        _object_container: &str,
        _prefix: &str,
    ) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn objects(&self, _container: &str) -> Result<Vec<ObjectRecord>, DestinationError> {
        Ok(Vec::new())
    }
}

/// Destination whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorDestination;

fn unavailable() -> DestinationError {
    DestinationError::Other {
        message: "destination unavailable".to_string(),
    }
}

#[async_trait]
impl Destination for ErrorDestination {
    async fn create_file(
        &self,
        _container: &str,
        _object: &str,
        _check_hash: bool,
        _hash: &str,
    ) -> Result<Box<dyn ObjectWriter>, DestinationError> {
        Err(unavailable())
    }

    async fn create_slo(
        &self,
        _container: &str,
        _manifest_name: &str,
        _manifest_etag: &str,
        _manifest_json: &[u8],
    ) -> Result<(), DestinationError> {
        Err(unavailable())
    }

    async fn create_dlo(
        &self,
        _manifest_container: &str,
        _manifest_name: &str,
        _object_container: &str,
        _prefix: &str,
    ) -> Result<(), DestinationError> {
        Err(unavailable())
    }

    async fn objects(&self, _container: &str) -> Result<Vec<ObjectRecord>, DestinationError> {
        Err(unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffer_destination_captures_object_bytes() {
        let dest: BufferDestination = BufferDestination::new();
        let mut upload = dest
            .create_file("container", "object", false, "")
            .await
            .unwrap();
        upload.write(b"hello ").await.unwrap();
        upload.write(b"world").await.unwrap();
        upload.close().await.unwrap();

        assert_eq!(
            dest.object_content("container", "object"),
            Some(b"hello world".to_vec())
        );
        let records = dest.objects("container").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hash, hash_bytes(b"hello world"));
        assert_eq!(records[0].bytes, 11);
    }

    #[tokio::test]
    async fn test_buffer_destination_verifies_hash_on_close() {
        let dest: BufferDestination = BufferDestination::new();
        let mut upload = dest
            .create_file("container", "object", true, &hash_bytes(b"expected"))
            .await
            .unwrap();
        upload.write(b"something else").await.unwrap();
        let result = upload.close().await;
        assert!(matches!(
            result,
            Err(DestinationError::HashMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_buffer_destination_seeded_objects_are_listed() {
        let dest: BufferDestination = BufferDestination::new();
        dest.seed_object("container", "object-chunk-0000-size-10", "abcd", 10);

        let names = dest.file_names("container").await.unwrap();
        assert_eq!(names, vec!["object-chunk-0000-size-10".to_string()]);
        let records = dest.objects("container").await.unwrap();
        assert_eq!(records[0].hash, "abcd");
    }

    #[tokio::test]
    async fn test_buffer_destination_records_manifests() {
        let dest: BufferDestination = BufferDestination::new();
        dest.create_slo("container", "object", "etag", br#"[]"#)
            .await
            .unwrap();

        let manifests = dest.manifests();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].name, "object");
        assert_eq!(manifests[0].etag, "etag");
        assert_eq!(manifests[0].json, b"[]".to_vec());
    }

    #[tokio::test]
    async fn test_captured_bytes_concatenates_in_name_order() {
        let dest: BufferDestination = BufferDestination::new();
        for (name, data) in [("c-0001", b"BB".as_slice()), ("c-0000", b"AA".as_slice())] {
            let mut upload = dest.create_file("container", name, false, "").await.unwrap();
            upload.write(data).await.unwrap();
            upload.close().await.unwrap();
        }
        assert_eq!(dest.captured_bytes("container"), b"AABB".to_vec());
    }

    #[tokio::test]
    async fn test_null_destination_accepts_everything() {
        let dest: NullDestination = NullDestination;
        let mut upload = dest.create_file("c", "o", true, "hash").await.unwrap();
        assert_eq!(upload.write(b"data").await.unwrap(), 4);
        upload.close().await.unwrap();
        dest.create_slo("c", "o", "etag", b"[]").await.unwrap();
        dest.create_dlo("c", "o", "c", "prefix").await.unwrap();
        assert!(dest.file_names("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_destination_fails_everything() {
        let dest: ErrorDestination = ErrorDestination;
        assert!(dest.create_file("c", "o", false, "").await.is_err());
        assert!(dest.create_slo("c", "o", "etag", b"[]").await.is_err());
        assert!(dest.create_dlo("c", "o", "c", "p").await.is_err());
        assert!(dest.objects("c").await.is_err());
        assert!(dest.file_names("c").await.is_err());
    }
}
