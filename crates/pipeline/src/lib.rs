//! Streaming SLO upload pipeline for OpenStack Swift object storage.
//!
//! Swift caps single objects at 5 GB and SLO manifests at 1000 segments,
//! so a large file is uploaded as fixed-size chunk objects plus a
//! manifest hierarchy that stitches them back together: leaf manifests of
//! up to 1000 chunks each, and a top-level manifest-of-manifests bearing
//! the final object name.
//!
//! The upload itself is a dataflow of small stages connected by bounded
//! streams of [`Chunk`] records. Each stage runs in its own task,
//! transforms chunks as they pass, forwards per-chunk failures on a
//! shared error stream, and shuts down when its input closes. The
//! combinators in [`stages`] are the wiring primitives; the named stages
//! (reader, hasher, namers, uploaders, manifest builder) give them their
//! domain behavior; and [`Uploader`] assembles the whole graph:
//!
//! ```text
//! plan → name → containerize → [skip existing] → upload ×N → count
//!     → manifest build → manifest upload → top manifest build → upload
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swiftslo_pipeline::{FileSource, Uploader, UploaderConfig};
//!
//! let config = UploaderConfig::new(chunk_size, "container", "backup.tar")
//!     .with_max_uploaders(8)
//!     .with_only_missing(true);
//! let source = Arc::new(FileSource::open("backup.tar")?);
//! let uploader = Uploader::new(destination, source, config, tokio::io::stderr()).await?;
//! uploader.upload().await?;
//! ```
//!
//! Memory stays bounded regardless of chunk size: the orchestrator wires
//! in the streaming uploader, which moves each chunk through a 4 KiB
//! buffer while computing its digest, and the buffered [`upload_data`]
//! variant clears chunk data as soon as it is stored.

mod chunk;
mod dlo;
mod error;
mod manifest;
mod object;
mod prepare;
mod source;
pub mod stages;
mod status;
mod upload;
mod uploader;

pub use chunk::{Chunk, ManifestEntry};
pub use dlo::DloUploader;
pub use error::{StageError, UploadError};
pub use manifest::{manifest_builder, upload_manifests};
pub use object::ObjectUploader;
pub use prepare::{containerizer, hash_data, object_namer, read_data};
pub use source::{plan, FileSource, MemorySource, RangeSource};
pub use stages::{consume, counter, divide, filter, fork, join, map, separate, Count};
pub use status::{Status, StatusSnapshot};
pub use upload::{read_hash_and_upload, upload_data};
pub use uploader::{Uploader, UploaderConfig};
