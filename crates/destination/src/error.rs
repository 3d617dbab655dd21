//! Error types for destination operations.

use thiserror::Error;

/// Errors that can occur while talking to an upload destination.
#[derive(Error, Debug, Clone)]
pub enum DestinationError {
    /// The store refused an object or manifest upload.
    #[error("upload of {object} rejected with status {status}: {body}")]
    Rejected {
        object: String,
        status: u16,
        body: String,
    },

    /// The store's computed digest disagreed with the caller's.
    #[error("hash mismatch for {object}: expected {expected}, got {actual}")]
    HashMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    /// An SLO manifest arrived with an ETag other than the expected one.
    #[error("manifest corrupted on upload: expected etag {expected}, got {actual}")]
    ManifestCorrupted { expected: String, actual: String },

    /// A container listing could not be retrieved.
    #[error("failed to list container {container}: {message}")]
    ListFailed { container: String, message: String },

    /// Transport-level failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}
