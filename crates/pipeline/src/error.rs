//! Error types for pipeline stages and the upload orchestrator.

use thiserror::Error;

use swiftslo_destination::DestinationError;

/// Per-chunk errors emitted on the pipeline's shared error stream.
///
/// A stage that hits one of these drops the offending chunk (or, for the
/// uploaders, forwards it after exhausting retries) and keeps consuming
/// its input; it never tears down the pipeline.
#[derive(Error, Debug)]
pub enum StageError {
    /// A chunk reached a stage that needs `size` set.
    #[error("chunk {number} has no size")]
    MissingSize { number: u64 },

    /// The data source returned fewer bytes than the chunk spans.
    #[error("expected to read {expected} bytes for chunk {number}, but only read {actual}")]
    ShortRead {
        number: u64,
        expected: u64,
        actual: u64,
    },

    /// The data source failed outright.
    #[error("failed to read chunk {number}: {message}")]
    Read { number: u64, message: String },

    /// A chunk reached the hasher without data.
    #[error("chunk {number} has no data to hash")]
    MissingData { number: u64 },

    /// A chunk reached an uploader without all required fields.
    #[error("chunk {number} is missing required data")]
    IncompleteChunk { number: u64 },

    /// A chunk reached the streaming uploader without an object name.
    #[error("chunk {number} has no object name")]
    MissingObject { number: u64 },

    /// A chunk reached the streaming uploader without a container.
    #[error("chunk {number} has no container name")]
    MissingContainer { number: u64 },

    /// Opening the upload handle failed.
    #[error("failed to create upload for chunk {number}: {source}")]
    CreateUpload {
        number: u64,
        source: DestinationError,
    },

    /// Writing the chunk body failed.
    #[error("failed to upload data for chunk {number}: {source}")]
    WriteUpload {
        number: u64,
        source: DestinationError,
    },

    /// The destination accepted fewer bytes than the chunk holds.
    #[error("uploaded {written} bytes for chunk {number} but chunk is {size} bytes long")]
    ShortUpload {
        number: u64,
        written: u64,
        size: u64,
    },

    /// Closing the upload handle failed.
    #[error("failed to close upload for chunk {number}: {source}")]
    CloseUpload {
        number: u64,
        source: DestinationError,
    },

    /// Every attempt to upload the chunk failed.
    #[error("final upload attempt for chunk {number} failed after {attempts} attempts")]
    UploadExhausted { number: u64, attempts: u32 },

    /// A manifest window referenced a chunk that never arrived.
    #[error("manifest {number} is missing chunk {missing}; refusing to build it")]
    ManifestHole { number: u64, missing: u64 },

    /// Manifest JSON could not be produced.
    #[error("failed to encode manifest {number}: {message}")]
    ManifestEncode { number: u64, message: String },

    /// The destination rejected a manifest.
    #[error("problem uploading manifest {object}: {source}")]
    ManifestUpload {
        object: String,
        source: DestinationError,
    },
}

/// Errors returned by the high-level uploaders.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Chunk size outside what a single Swift object can hold.
    #[error("chunk size must be between 1 byte and 5 GB")]
    InvalidChunkSize,

    /// Container names are required.
    #[error("container name cannot be the empty string")]
    EmptyContainer,

    /// Object names are required.
    #[error("object name cannot be the empty string")]
    EmptyObject,

    /// At least one upload task is required.
    #[error("unable to upload with {requested} uploaders (minimum 1 required)")]
    NoUploaders { requested: usize },

    /// The source needs more chunks than a two-level manifest can address.
    #[error("{size} byte source splits into {chunks} chunks, more than the {max} addressable")]
    TooManyChunks { size: u64, chunks: u64, max: u64 },

    /// A single-object upload was asked to carry more than 5 GB.
    #[error("source of {size} bytes is too large to upload as a single object (max 5 GB)")]
    SourceTooLarge { size: u64 },

    /// The data source could not be read.
    #[error("failed to read source: {message}")]
    SourceRead { message: String },

    /// A destination call failed.
    #[error(transparent)]
    Destination(#[from] DestinationError),

    /// The destination accepted fewer bytes than were written.
    #[error("wrote {written} bytes but source is {size} bytes long")]
    ShortWrite { written: u64, size: u64 },

    /// The pipeline observed errors; details went to the status output.
    #[error("encountered {count} errors during upload, check log output")]
    Failed { count: u64 },
}
