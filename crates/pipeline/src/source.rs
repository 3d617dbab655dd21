//! Random-access data sources and the chunk planner.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chunk::Chunk;
use crate::stages::STAGE_BUFFER;

/// A byte-addressable, read-only data source.
///
/// Positioned reads carry their own offset, so a single source can be
/// shared across any number of concurrent uploader tasks without a seek
/// cursor or a lock.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// # Returns
    /// The number of bytes read; `0` means `offset` is at or past the end.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// [`RangeSource`] backed by a file on disk.
pub struct FileSource {
    file: std::fs::File,
    size: u64,
}

impl FileSource {
    /// Open a file for positioned reads, capturing its current size.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file: std::fs::File = std::fs::File::open(path)?;
        let size: u64 = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl RangeSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset)
        }
    }
}

/// [`RangeSource`] over an in-memory byte buffer.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wrap a byte buffer as a data source.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl RangeSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset: usize = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let len: usize = buf.len().min(self.data.len() - offset);
        buf[..len].copy_from_slice(&self.data[offset..offset + len]);
        Ok(len)
    }
}

/// Plan the chunks needed to cover `data_size` bytes in regions of
/// `chunk_size`.
///
/// Emits chunks with `number` set sequentially from 0 upward, `offset` at
/// `number * chunk_size`, and `size` equal to `chunk_size` except for the
/// final chunk, which only spans the remainder. Also returns how many
/// chunks the stream will yield. Both sizes must be greater than zero and
/// `chunk_size` must not exceed `data_size`; otherwise the returned
/// stream is closed and empty and the count is 0. The planner performs no
/// I/O.
pub fn plan(data_size: u64, chunk_size: u64) -> (mpsc::Receiver<Chunk>, u64) {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    if data_size < 1 || chunk_size < 1 || chunk_size > data_size {
        return (rx, 0);
    }
    let num_chunks: u64 = data_size.div_ceil(chunk_size);
    tokio::spawn(async move {
        let mut number: u64 = 0;
        while number * chunk_size < data_size {
            let offset: u64 = number * chunk_size;
            let chunk = Chunk {
                number,
                offset,
                size: chunk_size.min(data_size - offset),
                ..Chunk::default()
            };
            if tx.send(chunk).await.is_err() {
                break;
            }
            number += 1;
        }
    });
    (rx, num_chunks)
}
