//! The capability boundary between the upload pipeline and object storage.

use async_trait::async_trait;

use crate::error::DestinationError;

/// A write-once handle to an object being created in a destination.
///
/// Obtained from [`Destination::create_file`]. Write the object body in
/// one or more calls, then close the handle to finish the upload.
/// Dropping a writer without closing abandons the upload.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Append bytes to the object body.
    ///
    /// # Returns
    /// The number of bytes accepted.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, DestinationError>;

    /// Finish the upload, surfacing any server-side verification failure.
    async fn close(self: Box<Self>) -> Result<(), DestinationError>;
}

/// Name, content digest, and size of one object in a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Object name within its container.
    pub name: String,
    /// Hex MD5 digest the store associates with the object.
    pub hash: String,
    /// Object size in bytes.
    pub bytes: u64,
}

/// A valid upload destination for files.
///
/// The pipeline only ever talks to object storage through this trait, so
/// tests can substitute the in-memory destinations from [`crate::mock`]
/// and production code can use [`crate::SwiftDestination`].
#[async_trait]
pub trait Destination: Send + Sync {
    /// Begin creating an object. Write data to the returned handle and
    /// close it to finish the upload.
    ///
    /// # Arguments
    /// * `container` - Destination container
    /// * `object` - Object name within the container
    /// * `check_hash` - Ask the destination to verify content against `hash`
    /// * `hash` - Expected hex MD5 of the body; may be empty when unknown
    async fn create_file(
        &self,
        container: &str,
        object: &str,
        check_hash: bool,
        hash: &str,
    ) -> Result<Box<dyn ObjectWriter>, DestinationError>;

    /// Atomically create a Static Large Object manifest from its JSON body.
    ///
    /// The destination must reject the manifest when the store's computed
    /// ETag differs from `manifest_etag`.
    async fn create_slo(
        &self,
        container: &str,
        manifest_name: &str,
        manifest_etag: &str,
        manifest_json: &[u8],
    ) -> Result<(), DestinationError>;

    /// Create a Dynamic Large Object manifest. The object store will serve
    /// every object in `object_container` whose name starts with `prefix`
    /// as one logical object.
    async fn create_dlo(
        &self,
        manifest_container: &str,
        manifest_name: &str,
        object_container: &str,
        prefix: &str,
    ) -> Result<(), DestinationError>;

    /// List the objects already present in a container.
    async fn objects(&self, container: &str) -> Result<Vec<ObjectRecord>, DestinationError>;

    /// List only the names of the objects already present in a container.
    async fn file_names(&self, container: &str) -> Result<Vec<String>, DestinationError> {
        Ok(self
            .objects(container)
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect())
    }
}
