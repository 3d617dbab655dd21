//! Upload progress tracking.
//!
//! Many uploader tasks report completions while other callers want
//! consistent snapshots, so the state lives in a single actor task that
//! owns it outright. The [`Status`] handle is the only way in: completions
//! and start/stop signals are fire-and-forget messages, and snapshot
//! requests carry a reply channel. Derived figures (rate, percent, time
//! remaining) are computed on a [`StatusSnapshot`], so readers never see
//! torn state.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

enum StatusMsg {
    Start,
    Stop,
    ChunkCompleted,
    Snapshot(oneshot::Sender<StatusSnapshot>),
}

/// A consistent copy of the upload's progress at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// Size in bytes of each upload (the last chunk may be smaller).
    pub upload_size: u64,
    /// How many chunk uploads the run will perform in total.
    pub total_uploads: u64,
    /// How many chunk uploads have completed.
    pub number_uploaded: u64,
    /// When the upload started, if it has.
    started: Option<Instant>,
    /// Total duration of the upload, once it has stopped.
    duration: Option<Duration>,
}

impl StatusSnapshot {
    /// Observed upload rate in bytes per second.
    pub fn rate(&self) -> f64 {
        let Some(started) = self.started else {
            return 0.0;
        };
        match self.duration {
            Some(duration) => {
                (self.total_uploads * self.upload_size) as f64 / duration.as_secs_f64()
            }
            None => {
                (self.number_uploaded * self.upload_size) as f64
                    / started.elapsed().as_secs_f64()
            }
        }
    }

    /// Observed upload rate in megabytes per second.
    pub fn rate_mbps(&self) -> f64 {
        self.rate() / 1e6
    }

    /// How much of the upload is complete, as a percentage.
    pub fn percent_complete(&self) -> f64 {
        if self.total_uploads == 0 {
            return 0.0;
        }
        self.number_uploaded as f64 / self.total_uploads as f64 * 100.0
    }

    /// Estimated time until the upload completes at the observed rate.
    pub fn time_remaining(&self) -> Duration {
        let rate: f64 = self.rate();
        if rate <= 0.0 {
            return Duration::ZERO;
        }
        let remaining_bytes = (self.total_uploads - self.number_uploaded) * self.upload_size;
        Duration::from_secs((remaining_bytes as f64 / rate) as u64)
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.started.is_none() {
            return write!(f, "Upload not started yet");
        }
        if let Some(duration) = self.duration {
            return write!(
                f,
                "Upload finished in {:?} at approximately {:.2} MB/sec",
                duration,
                self.rate_mbps()
            );
        }
        write!(
            f,
            "{:.2}% Uploaded\tAverage Upload Speed {:.2} MB/sec\t{:?} Remaining",
            self.percent_complete(),
            self.rate_mbps(),
            self.time_remaining()
        )
    }
}

/// Handle to the status actor monitoring an upload.
///
/// Cloning the handle is cheap; the actor exits once every handle is
/// dropped.
#[derive(Clone)]
pub struct Status {
    messages: mpsc::Sender<StatusMsg>,
}

impl Status {
    /// Start a status actor for an upload of `total_uploads` chunks of
    /// `upload_size` bytes each.
    pub fn new(total_uploads: u64, upload_size: u64) -> Self {
        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut current = StatusSnapshot {
                upload_size,
                total_uploads,
                ..StatusSnapshot::default()
            };
            while let Some(message) = rx.recv().await {
                match message {
                    StatusMsg::Start => {
                        if current.started.is_none() {
                            current.started = Some(Instant::now());
                        }
                    }
                    StatusMsg::Stop => {
                        if let (Some(started), None) = (current.started, current.duration) {
                            current.duration = Some(started.elapsed());
                        }
                    }
                    StatusMsg::ChunkCompleted => current.number_uploaded += 1,
                    StatusMsg::Snapshot(reply) => {
                        let _ = reply.send(current.clone());
                    }
                }
            }
        });
        Self { messages: tx }
    }

    /// Begin timing the upload.
    pub async fn start(&self) {
        let _ = self.messages.send(StatusMsg::Start).await;
    }

    /// Finalize the duration of the upload.
    pub async fn stop(&self) {
        let _ = self.messages.send(StatusMsg::Stop).await;
    }

    /// Record that one chunk finished uploading. Call this each time an
    /// upload succeeds.
    pub async fn chunk_completed(&self) {
        let _ = self.messages.send(StatusMsg::ChunkCompleted).await;
    }

    /// Retrieve a consistent snapshot of the current progress.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.messages.send(StatusMsg::Snapshot(reply_tx)).await.is_err() {
            return StatusSnapshot::default();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// The current status line, as written to the status output.
    pub async fn report(&self) -> String {
        self.snapshot().await.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_started_snapshot() {
        let status: Status = Status::new(10, 100);
        let snapshot: StatusSnapshot = status.snapshot().await;
        assert_eq!(snapshot.total_uploads, 10);
        assert_eq!(snapshot.number_uploaded, 0);
        assert_eq!(snapshot.rate(), 0.0);
        assert_eq!(status.report().await, "Upload not started yet");
    }

    #[tokio::test]
    async fn test_completions_accumulate() {
        let status: Status = Status::new(4, 100);
        status.start().await;
        status.chunk_completed().await;
        status.chunk_completed().await;

        let snapshot: StatusSnapshot = status.snapshot().await;
        assert_eq!(snapshot.number_uploaded, 2);
        assert_eq!(snapshot.percent_complete(), 50.0);
        assert!(status.report().await.contains("% Uploaded"));
    }

    #[tokio::test]
    async fn test_stop_freezes_duration() {
        let status: Status = Status::new(2, 100);
        status.start().await;
        status.chunk_completed().await;
        status.chunk_completed().await;
        status.stop().await;

        let snapshot: StatusSnapshot = status.snapshot().await;
        assert!(snapshot.rate() > 0.0);
        assert!(status.report().await.starts_with("Upload finished in"));
    }

    #[tokio::test]
    async fn test_clones_share_one_actor() {
        let status: Status = Status::new(4, 1);
        let other: Status = status.clone();
        status.start().await;
        other.chunk_completed().await;
        status.chunk_completed().await;
        assert_eq!(other.snapshot().await.number_uploaded, 2);
    }

    #[tokio::test]
    async fn test_percent_complete_with_zero_total() {
        let status: Status = Status::new(0, 0);
        assert_eq!(status.snapshot().await.percent_complete(), 0.0);
    }
}
