//! Upload stages: sending chunk data to a [`Destination`] with retry.
//!
//! Two interchangeable stages share the same contract:
//!
//! - [`upload_data`] uploads chunks whose data was already read into
//!   memory by an upstream [`crate::prepare::read_data`] stage.
//! - [`read_hash_and_upload`] reads, hashes, and uploads in one pass
//!   through a small fixed buffer, so a chunk's bytes are never resident
//!   in full. Use this when memory footprint is a concern; it is what the
//!   orchestrator wires in.
//!
//! Both retry failed attempts on an exponential backoff and, after the
//! final attempt fails, still forward the chunk downstream so that the
//! dataflow stays acyclic. Callers must treat the error count on the
//! shared error stream as authoritative for the run's success.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use swiftslo_common::{Md5Hasher, MAX_UPLOAD_ATTEMPTS, STREAM_BUFFER_SIZE};
use swiftslo_destination::Destination;

use crate::chunk::Chunk;
use crate::error::StageError;
use crate::source::RangeSource;
use crate::stages::STAGE_BUFFER;

/// Upload fully populated chunks, verifying each upload against the
/// chunk's hash and retrying on failure.
///
/// Chunks must be upload-ready (size, data, object, container, and hash
/// all present); incomplete chunks produce a single error and no output.
/// Whether or not its upload succeeded, each chunk is forwarded with its
/// data cleared to free memory. `retry_wait` is the base wait before a
/// retry; attempt `n` sleeps `retry_wait * 2^n`, and a zero wait is
/// useful for tests.
pub fn upload_data(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    destination: Arc<dyn Destination>,
    retry_wait: Duration,
) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(mut chunk) = input.recv().await {
            if !chunk.upload_ready() {
                let _ = errors
                    .send(StageError::IncompleteChunk {
                        number: chunk.number,
                    })
                    .await;
                continue;
            }
            let mut attempts: u32 = 1;
            loop {
                match attempt_buffered(&destination, &chunk).await {
                    Ok(()) => break,
                    Err(err) => {
                        let _ = errors.send(err).await;
                        if attempts >= MAX_UPLOAD_ATTEMPTS {
                            let _ = errors
                                .send(StageError::UploadExhausted {
                                    number: chunk.number,
                                    attempts,
                                })
                                .await;
                            break;
                        }
                        sleep(retry_wait * (1u32 << attempts)).await;
                        attempts += 1;
                    }
                }
            }
            chunk.data = Vec::new();
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// One pass at uploading an in-memory chunk.
async fn attempt_buffered(
    destination: &Arc<dyn Destination>,
    chunk: &Chunk,
) -> Result<(), StageError> {
    let mut upload = destination
        .create_file(&chunk.container, &chunk.object, true, &chunk.hash)
        .await
        .map_err(|source| StageError::CreateUpload {
            number: chunk.number,
            source,
        })?;
    let written = upload
        .write(&chunk.data)
        .await
        .map_err(|source| StageError::WriteUpload {
            number: chunk.number,
            source,
        })?;
    if written as u64 != chunk.size {
        return Err(StageError::ShortUpload {
            number: chunk.number,
            written: written as u64,
            size: chunk.size,
        });
    }
    upload
        .close()
        .await
        .map_err(|source| StageError::CloseUpload {
            number: chunk.number,
            source,
        })
}

/// Read each chunk's region from the source, hash it, and upload it, all
/// through one reused [`STREAM_BUFFER_SIZE`] buffer.
///
/// Incoming chunks need `size`, `offset`, `object`, and `container` set;
/// `data` stays empty throughout and `hash` is produced by the running
/// digest as the bytes stream out. Before each retry the digest is reset
/// and a fresh write handle opened. Retry and forwarding behavior match
/// [`upload_data`].
pub fn read_hash_and_upload(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    source: Arc<dyn RangeSource>,
    destination: Arc<dyn Destination>,
    retry_wait: Duration,
) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        let mut buffer: Vec<u8> = vec![0u8; STREAM_BUFFER_SIZE];
        while let Some(mut chunk) = input.recv().await {
            let rejection: Option<StageError> = if chunk.size < 1 {
                Some(StageError::MissingSize {
                    number: chunk.number,
                })
            } else if chunk.object.is_empty() {
                Some(StageError::MissingObject {
                    number: chunk.number,
                })
            } else if chunk.container.is_empty() {
                Some(StageError::MissingContainer {
                    number: chunk.number,
                })
            } else {
                None
            };
            if let Some(err) = rejection {
                let _ = errors.send(err).await;
                continue;
            }

            let mut attempts: u32 = 1;
            loop {
                match attempt_streamed(&destination, &source, &chunk, &mut buffer).await {
                    Ok(hash) => {
                        chunk.hash = hash;
                        break;
                    }
                    Err(err) => {
                        let _ = errors.send(err).await;
                        if attempts >= MAX_UPLOAD_ATTEMPTS {
                            let _ = errors
                                .send(StageError::UploadExhausted {
                                    number: chunk.number,
                                    attempts,
                                })
                                .await;
                            break;
                        }
                        sleep(retry_wait * (1u32 << attempts)).await;
                        attempts += 1;
                    }
                }
            }
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// One pass at streaming a chunk's region into a fresh upload handle,
/// returning the hex digest of the bytes that went out.
async fn attempt_streamed(
    destination: &Arc<dyn Destination>,
    source: &Arc<dyn RangeSource>,
    chunk: &Chunk,
    buffer: &mut [u8],
) -> Result<String, StageError> {
    // The destination is asked to verify its own digest as well, but the
    // running hasher is still needed here to fill in the manifest entry.
    let mut hasher: Md5Hasher = Md5Hasher::new();
    let mut upload = destination
        .create_file(&chunk.container, &chunk.object, true, "")
        .await
        .map_err(|source| StageError::CreateUpload {
            number: chunk.number,
            source,
        })?;

    let mut sent: u64 = 0;
    while sent < chunk.size {
        let want: usize = buffer.len().min((chunk.size - sent) as usize);
        let read = source
            .read_at(chunk.offset + sent, &mut buffer[..want])
            .await
            .map_err(|err| StageError::Read {
                number: chunk.number,
                message: err.to_string(),
            })?;
        if read == 0 {
            return Err(StageError::ShortRead {
                number: chunk.number,
                expected: chunk.size,
                actual: sent,
            });
        }
        hasher.update(&buffer[..read]);
        let written = upload
            .write(&buffer[..read])
            .await
            .map_err(|source| StageError::WriteUpload {
                number: chunk.number,
                source,
            })?;
        if written != read {
            return Err(StageError::ShortUpload {
                number: chunk.number,
                written: sent + written as u64,
                size: chunk.size,
            });
        }
        sent += read as u64;
    }

    upload
        .close()
        .await
        .map_err(|source| StageError::CloseUpload {
            number: chunk.number,
            source,
        })?;
    Ok(hasher.finish_hex())
}
