//! Dynamic Large Object manifest uploads.

use std::sync::Arc;

use swiftslo_destination::Destination;

use crate::error::UploadError;

/// Prepares and executes the upload of a Dynamic Large Object manifest.
///
/// The `dlo_container` determines where the DLO manifest is stored,
/// whereas the `object_container` determines which container the store
/// searches for objects beginning with `prefix`. This allows the manifest
/// to live in one container while referencing segments in another.
pub struct DloUploader {
    connection: Arc<dyn Destination>,
    dlo_container: String,
    dlo_name: String,
    object_container: String,
    prefix: String,
}

impl DloUploader {
    /// Create an uploader that will create a new DLO.
    pub fn new(
        connection: Arc<dyn Destination>,
        dlo_container: impl Into<String>,
        dlo_name: impl Into<String>,
        object_container: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            dlo_container: dlo_container.into(),
            dlo_name: dlo_name.into(),
            object_container: object_container.into(),
            prefix: prefix.into(),
        }
    }

    /// Perform the upload that creates the DLO.
    pub async fn upload(&self) -> Result<(), UploadError> {
        self.connection
            .create_dlo(
                &self.dlo_container,
                &self.dlo_name,
                &self.object_container,
                &self.prefix,
            )
            .await?;
        Ok(())
    }
}
