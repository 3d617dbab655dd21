//! Stages that enrich planned chunks until they are ready to upload:
//! reading data, hashing it, and assigning destination names.

use std::sync::Arc;

use tokio::sync::mpsc;

use swiftslo_common::hash_bytes;

use crate::chunk::Chunk;
use crate::error::StageError;
use crate::source::RangeSource;
use crate::stages::{map, STAGE_BUFFER};

/// Populate each chunk's `data` with the bytes of its file region.
///
/// Chunks need `size` and `offset` set. A chunk whose region cannot be
/// read in full is dropped and an error emitted in its place.
pub fn read_data(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    source: Arc<dyn RangeSource>,
) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(mut chunk) = input.recv().await {
            if chunk.size < 1 {
                let _ = errors
                    .send(StageError::MissingSize {
                        number: chunk.number,
                    })
                    .await;
                continue;
            }
            let mut buffer: Vec<u8> = vec![0u8; chunk.size as usize];
            match read_region(source.as_ref(), &chunk, &mut buffer).await {
                Ok(()) => {
                    chunk.data = buffer;
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = errors.send(err).await;
                }
            }
        }
    });
    rx
}

/// Fill `buffer` from the chunk's region, retrying short reads until the
/// region is complete or the source gives out.
async fn read_region(
    source: &dyn RangeSource,
    chunk: &Chunk,
    buffer: &mut [u8],
) -> Result<(), StageError> {
    let mut filled: usize = 0;
    while filled < buffer.len() {
        match source
            .read_at(chunk.offset + filled as u64, &mut buffer[filled..])
            .await
        {
            Ok(0) => {
                return Err(StageError::ShortRead {
                    number: chunk.number,
                    expected: chunk.size,
                    actual: filled as u64,
                })
            }
            Ok(read) => filled += read,
            Err(err) => {
                return Err(StageError::Read {
                    number: chunk.number,
                    message: err.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Attach the MD5 digest of each chunk's data. Chunks must already have
/// data; chunks without it produce errors instead. Data is left in place.
pub fn hash_data(
    input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
) -> mpsc::Receiver<Chunk> {
    map(input, errors, |mut chunk| {
        if chunk.data.is_empty() {
            return Err(StageError::MissingData {
                number: chunk.number,
            });
        }
        chunk.hash = hash_bytes(&chunk.data);
        Ok(chunk)
    })
}

/// Assign each chunk its object name, computed from its number and size.
///
/// The stage is idempotent: renaming a chunk simply overwrites the name.
pub fn object_namer<F>(
    input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    namer: F,
) -> mpsc::Receiver<Chunk>
where
    F: Fn(u64, u64) -> String + Send + 'static,
{
    map(input, errors, move |mut chunk| {
        chunk.object = namer(chunk.number, chunk.size);
        Ok(chunk)
    })
}

/// Assign each chunk the provided container. Idempotent.
pub fn containerizer(
    input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    container: String,
) -> mpsc::Receiver<Chunk> {
    map(input, errors, move |mut chunk| {
        chunk.container = container.clone();
        Ok(chunk)
    })
}
