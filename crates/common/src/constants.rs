//! Shared constants used across swiftslo crates.

use std::time::Duration;

/// The maximum number of segments that OpenStack object storage allows
/// within a single SLO manifest.
pub const MAX_MANIFEST_CHUNKS: usize = 1000;

/// The largest allowable size in bytes for a single object in OpenStack
/// object storage (5 GB).
pub const MAX_CHUNK_SIZE: u64 = 1000 * 1000 * 1000 * 5;

/// The most chunks a two-level manifest hierarchy can address: 1000 leaf
/// manifests of 1000 segments each.
pub const MAX_ADDRESSABLE_CHUNKS: u64 = (MAX_MANIFEST_CHUNKS * MAX_MANIFEST_CHUNKS) as u64;

/// How many times a chunk upload is attempted before giving up.
pub const MAX_UPLOAD_ATTEMPTS: u32 = 5;

/// Base wait between upload retries; attempt `n` sleeps `wait * 2^n`.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(1);

/// Read buffer size for the streaming uploader. 4 KiB keeps the total
/// footprint low without measurably slowing uploads.
pub const STREAM_BUFFER_SIZE: usize = 1024 * 4;

/// How often the orchestrator reports upload progress by default.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(60);
