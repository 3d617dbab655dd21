//! Whole-file uploads for sources small enough to be single objects.

use std::sync::Arc;

use swiftslo_common::{hash_bytes, MAX_CHUNK_SIZE};
use swiftslo_destination::Destination;

use crate::error::UploadError;
use crate::source::RangeSource;

/// Uploads a source as one ordinary object, with its MD5 checked by the
/// destination. Sources larger than 5 GB must use [`crate::Uploader`]
/// instead.
pub struct ObjectUploader {
    connection: Arc<dyn Destination>,
    source: Arc<dyn RangeSource>,
    container: String,
    object_name: String,
}

impl ObjectUploader {
    /// Create an uploader for a single object.
    pub fn new(
        connection: Arc<dyn Destination>,
        source: Arc<dyn RangeSource>,
        container: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            source,
            container: container.into(),
            object_name: object_name.into(),
        }
    }

    /// Upload the source as one object.
    pub async fn upload(&self) -> Result<(), UploadError> {
        let size: u64 = self.source.size();
        if size > MAX_CHUNK_SIZE {
            return Err(UploadError::SourceTooLarge { size });
        }

        let data: Vec<u8> = self.read_source(size).await?;
        let hash: String = hash_bytes(&data);

        let mut upload = self
            .connection
            .create_file(&self.container, &self.object_name, true, &hash)
            .await?;
        let written = upload.write(&data).await?;
        if written as u64 != size {
            return Err(UploadError::ShortWrite {
                written: written as u64,
                size,
            });
        }
        upload.close().await?;
        Ok(())
    }

    async fn read_source(&self, size: u64) -> Result<Vec<u8>, UploadError> {
        let mut data: Vec<u8> = vec![0u8; size as usize];
        let mut filled: usize = 0;
        while filled < data.len() {
            let read = self
                .source
                .read_at(filled as u64, &mut data[filled..])
                .await
                .map_err(|err| UploadError::SourceRead {
                    message: err.to_string(),
                })?;
            if read == 0 {
                return Err(UploadError::SourceRead {
                    message: format!("source ended after {filled} of {size} bytes"),
                });
            }
            filled += read;
        }
        Ok(data)
    }
}
