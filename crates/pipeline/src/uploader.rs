//! The SLO upload orchestrator.
//!
//! [`Uploader`] wires the full pipeline together: planner → namer →
//! containerizer → (skip already-uploaded) → fan-out streaming uploaders
//! → counter → leaf manifest builder and uploader → top-level manifest
//! builder and uploader. Construction validates the configuration and
//! builds the graph; [`Uploader::upload`] feeds it, drains it, and counts
//! errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::warn;

use swiftslo_common::{
    chunk_object_name, manifest_object_name, parse_chunk_number, DEFAULT_RETRY_WAIT,
    DEFAULT_STATUS_INTERVAL, MAX_ADDRESSABLE_CHUNKS, MAX_CHUNK_SIZE,
};
use swiftslo_destination::{Destination, ObjectRecord};

use crate::chunk::Chunk;
use crate::error::{StageError, UploadError};
use crate::manifest::{manifest_builder, upload_manifests};
use crate::prepare::{containerizer, object_namer};
use crate::source::{plan, RangeSource};
use crate::stages::{counter, divide, join, map, separate, Count, STAGE_BUFFER};
use crate::status::Status;
use crate::upload::read_hash_and_upload;

/// Settings for an SLO upload.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Bytes per chunk; between 1 and 5 GB.
    pub chunk_size: u64,
    /// Destination container for chunks and manifests.
    pub container: String,
    /// Final, user-visible object name.
    pub object: String,
    /// How many uploader tasks run in parallel.
    pub max_uploaders: usize,
    /// Skip chunks whose named object already exists in the container.
    pub only_missing: bool,
    /// Base wait before an upload retry; attempt `n` sleeps `wait * 2^n`.
    pub retry_wait: Duration,
    /// How often a progress line is written to the status output.
    pub status_interval: Duration,
}

impl UploaderConfig {
    /// Create a configuration with defaults for everything but the
    /// required fields.
    pub fn new(chunk_size: u64, container: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            chunk_size,
            container: container.into(),
            object: object.into(),
            max_uploaders: 1,
            only_missing: false,
            retry_wait: DEFAULT_RETRY_WAIT,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }

    /// Set the number of parallel uploader tasks.
    pub fn with_max_uploaders(mut self, max_uploaders: usize) -> Self {
        self.max_uploaders = max_uploaders;
        self
    }

    /// Upload only chunks that are missing from the destination.
    pub fn with_only_missing(mut self, only_missing: bool) -> Self {
        self.only_missing = only_missing;
        self
    }

    /// Set the base retry wait. Zero disables the backoff sleep, which is
    /// useful for tests.
    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    /// Set how often progress is reported.
    pub fn with_status_interval(mut self, status_interval: Duration) -> Self {
        self.status_interval = status_interval;
        self
    }
}

/// Uploads a file to object storage as a Static Large Object.
pub struct Uploader {
    status: Status,
    planned: mpsc::Receiver<Chunk>,
    intake: mpsc::Sender<Chunk>,
    pipeline_out: mpsc::Receiver<Chunk>,
    upload_counts: mpsc::Receiver<Count>,
    errors: mpsc::Receiver<StageError>,
    error_tx: mpsc::Sender<StageError>,
    output: mpsc::Sender<String>,
    printer: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl Uploader {
    /// Validate the configuration and build the upload pipeline.
    ///
    /// In only-missing mode the destination container is listed here; a
    /// listing failure is reported to the status output and treated as an
    /// empty container, so the upload proceeds as if nothing existed.
    ///
    /// # Arguments
    /// * `destination` - Where chunks and manifests are created
    /// * `source` - Random-access data to upload
    /// * `config` - Upload settings
    /// * `status_output` - Writer that receives human-readable progress lines
    pub async fn new(
        destination: Arc<dyn Destination>,
        source: Arc<dyn RangeSource>,
        config: UploaderConfig,
        status_output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Result<Uploader, UploadError> {
        if config.max_uploaders < 1 {
            return Err(UploadError::NoUploaders {
                requested: config.max_uploaders,
            });
        }
        if config.container.is_empty() {
            return Err(UploadError::EmptyContainer);
        }
        if config.object.is_empty() {
            return Err(UploadError::EmptyObject);
        }
        if config.chunk_size < 1 || config.chunk_size > MAX_CHUNK_SIZE {
            return Err(UploadError::InvalidChunkSize);
        }
        let data_size: u64 = source.size();
        if data_size > 0 && data_size.div_ceil(config.chunk_size) > MAX_ADDRESSABLE_CHUNKS {
            return Err(UploadError::TooManyChunks {
                size: data_size,
                chunks: data_size.div_ceil(config.chunk_size),
                max: MAX_ADDRESSABLE_CHUNKS,
            });
        }

        let (output, output_rx) = mpsc::channel::<String>(10);
        let printer: JoinHandle<()> = tokio::spawn(print_lines(status_output, output_rx));

        // In only-missing mode the listing decides which chunks to skip
        // and supplies the hashes their manifest entries will carry.
        let listed: Vec<ObjectRecord> = if config.only_missing {
            match destination.objects(&config.container).await {
                Ok(records) => records,
                Err(err) => {
                    warn!(container = %config.container, %err, "listing failed; uploading all chunks");
                    let _ = output
                        .send(format!(
                            "Problem getting existing chunk names from object storage: {err}"
                        ))
                        .await;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let existing_hashes: HashMap<String, String> = listed
            .into_iter()
            .map(|record| (record.name, record.hash))
            .collect();
        if config.only_missing {
            let already: usize = existing_hashes
                .keys()
                .filter(|name| parse_chunk_number(&config.object, name).is_some())
                .count();
            let _ = output
                .send(format!(
                    "{already} chunks already uploaded; manifest files are always re-uploaded"
                ))
                .await;
        }

        let (planned, num_chunks) = plan(data_size, config.chunk_size);
        let status: Status = Status::new(num_chunks, config.chunk_size);
        let ticker: JoinHandle<()> = tokio::spawn({
            let status = status.clone();
            let output = output.clone();
            let interval = config.status_interval;
            async move {
                loop {
                    sleep(interval).await;
                    if output.send(status.report().await).await.is_err() {
                        break;
                    }
                }
            }
        });

        // Initialize the pipeline, but don't pass in data yet.
        let (intake, intake_rx) = mpsc::channel(STAGE_BUFFER);
        let (error_tx, errors) = mpsc::channel(STAGE_BUFFER);

        let chunks = object_namer(intake_rx, error_tx.clone(), {
            let object = config.object.clone();
            move |number, size| chunk_object_name(&object, number, size)
        });
        let chunks = containerizer(chunks, error_tx.clone(), config.container.clone());

        // Chunks whose object already exists skip the uploaders entirely;
        // the server-reported hash stands in for one computed locally.
        let (existing, missing) = separate(chunks, error_tx.clone(), {
            let names = existing_hashes.clone();
            move |chunk| Ok(names.contains_key(&chunk.object))
        });
        let existing = map(existing, error_tx.clone(), move |mut chunk| {
            if let Some(hash) = existing_hashes.get(&chunk.object) {
                chunk.hash = hash.clone();
            }
            Ok(chunk)
        });

        let upload_streams = divide(missing, config.max_uploaders);
        let done_streams: Vec<mpsc::Receiver<Chunk>> = upload_streams
            .into_iter()
            .map(|stream| {
                read_hash_and_upload(
                    stream,
                    error_tx.clone(),
                    Arc::clone(&source),
                    Arc::clone(&destination),
                    config.retry_wait,
                )
            })
            .collect();
        let uploaded = join(done_streams);
        let (uploaded, upload_counts) = counter(uploaded);
        let chunks = join(vec![existing, uploaded]);

        // Build and upload manifest layer 1.
        let manifests = manifest_builder(chunks, error_tx.clone());
        let manifests = object_namer(manifests, error_tx.clone(), {
            let object = config.object.clone();
            move |number, _size| manifest_object_name(&object, number)
        });
        let manifests = containerizer(manifests, error_tx.clone(), config.container.clone());
        let manifests = announce_manifests(manifests, output.clone());
        let manifests = upload_manifests(manifests, error_tx.clone(), Arc::clone(&destination));

        // Build the top-level manifest out of layer 1.
        let top_manifests = manifest_builder(manifests, error_tx.clone());
        let top_manifests = object_namer(top_manifests, error_tx.clone(), {
            let object = config.object.clone();
            move |_number, _size| object.clone()
        });
        let top_manifests =
            containerizer(top_manifests, error_tx.clone(), config.container.clone());
        let top_manifests = announce_manifests(top_manifests, output.clone());
        let pipeline_out = upload_manifests(top_manifests, error_tx.clone(), destination);

        Ok(Uploader {
            status,
            planned,
            intake,
            pipeline_out,
            upload_counts,
            errors,
            error_tx,
            output,
            printer,
            ticker,
        })
    }

    /// The status monitor for this upload.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Upload the source to object storage.
    ///
    /// Drives planned chunks into the pipeline, drains the final manifest
    /// stream, and counts every error observed along the way. Succeeds
    /// only when the run finished with zero errors.
    pub async fn upload(self) -> Result<(), UploadError> {
        let Uploader {
            status,
            mut planned,
            intake,
            mut pipeline_out,
            mut upload_counts,
            mut errors,
            error_tx,
            output,
            printer,
            ticker,
        } = self;

        status.start().await;

        // Every completed upload advances the status monitor.
        let counts_task: JoinHandle<()> = tokio::spawn({
            let status = status.clone();
            async move {
                while upload_counts.recv().await.is_some() {
                    status.chunk_completed().await;
                }
                status.stop().await;
            }
        });

        // Drain the uploaded top-level manifests; once this stream closes
        // every stage has finished and the error stream can close too.
        let drain_task: JoinHandle<()> =
            tokio::spawn(async move { while pipeline_out.recv().await.is_some() {} });

        // Feed the planned chunks through the pipeline's intake.
        let feed_task: JoinHandle<()> = tokio::spawn(async move {
            while let Some(chunk) = planned.recv().await {
                if intake.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        // Dropping the construction-time sender makes stage completion
        // close the error stream.
        drop(error_tx);
        let mut error_count: u64 = 0;
        while let Some(err) = errors.recv().await {
            error_count += 1;
            let _ = output.send(err.to_string()).await;
        }

        let _ = feed_task.await;
        let _ = drain_task.await;
        let _ = counts_task.await;
        ticker.abort();

        let _ = output.send(status.report().await).await;
        drop(output);
        drop(status);
        let _ = printer.await;

        if error_count == 0 {
            Ok(())
        } else {
            Err(UploadError::Failed { count: error_count })
        }
    }
}

/// Write each status line to the status output.
async fn print_lines(
    mut writer: impl AsyncWrite + Send + Unpin + 'static,
    mut lines: mpsc::Receiver<String>,
) {
    while let Some(line) = lines.recv().await {
        if let Err(err) = writer.write_all(line.as_bytes()).await {
            warn!(%err, "failed to write status line");
            continue;
        }
        if let Err(err) = writer.write_all(b"\n").await {
            warn!(%err, "failed to write status line");
        }
    }
}

/// Report each manifest on the status output as it heads to upload.
fn announce_manifests(
    mut input: mpsc::Receiver<Chunk>,
    output: mpsc::Sender<String>,
) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(chunk) = input.recv().await {
            let _ = output
                .send(format!("Uploading manifest: {}", chunk.path()))
                .await;
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    rx
}
