//! Generic stream combinators for wiring chunk pipelines.
//!
//! Each combinator consumes one or more chunk streams and returns new
//! ones, spawning a task that runs until its inputs close. Streams are
//! bounded channels of capacity [`STAGE_BUFFER`], so a slow downstream
//! stage throttles upstream producers instead of letting work queue
//! without limit. Errors travel on a shared error stream that must be
//! drained concurrently with the data.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::chunk::Chunk;
use crate::error::StageError;

/// Capacity of every inter-stage channel.
pub const STAGE_BUFFER: usize = 1;

/// Apply `operation` to each chunk that passes through. A chunk whose
/// operation fails is dropped and the error is forwarded instead.
pub fn map<F>(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    mut operation: F,
) -> mpsc::Receiver<Chunk>
where
    F: FnMut(Chunk) -> Result<Chunk, StageError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(chunk) = input.recv().await {
            match operation(chunk) {
                Ok(chunk) => {
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

/// Pass on only the chunks that satisfy `predicate`. A chunk whose
/// predicate fails is dropped and the error is forwarded instead.
pub fn filter<F>(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    mut predicate: F,
) -> mpsc::Receiver<Chunk>
where
    F: FnMut(&Chunk) -> Result<bool, StageError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(chunk) = input.recv().await {
            match predicate(&chunk) {
                Ok(true) => {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    let _ = errors.send(err).await;
                }
            }
        }
    });
    rx
}

/// Split the input into two streams on `condition`: chunks for which it
/// holds go to the first output, the rest to the second.
pub fn separate<F>(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    mut condition: F,
) -> (mpsc::Receiver<Chunk>, mpsc::Receiver<Chunk>)
where
    F: FnMut(&Chunk) -> Result<bool, StageError> + Send + 'static,
{
    let (yes_tx, yes_rx) = mpsc::channel(STAGE_BUFFER);
    let (no_tx, no_rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(chunk) = input.recv().await {
            match condition(&chunk) {
                Ok(true) => {
                    if yes_tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Ok(false) => {
                    if no_tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = errors.send(err).await;
                }
            }
        }
    });
    (yes_rx, no_rx)
}

/// Copy every chunk into two output streams, allowing a pipeline to
/// diverge. Back-pressures on the slower consumer.
pub fn fork(mut input: mpsc::Receiver<Chunk>) -> (mpsc::Receiver<Chunk>, mpsc::Receiver<Chunk>) {
    let (a_tx, a_rx) = mpsc::channel(STAGE_BUFFER);
    let (b_tx, b_rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(chunk) = input.recv().await {
            if a_tx.send(chunk.clone()).await.is_err() {
                break;
            }
            if b_tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    (a_rx, b_rx)
}

/// Distribute the input round-robin across `divisor` new streams for
/// fan-out parallelism.
pub fn divide(mut input: mpsc::Receiver<Chunk>, divisor: usize) -> Vec<mpsc::Receiver<Chunk>> {
    debug_assert!(divisor > 0);
    let mut senders: Vec<mpsc::Sender<Chunk>> = Vec::with_capacity(divisor);
    let mut receivers: Vec<mpsc::Receiver<Chunk>> = Vec::with_capacity(divisor);
    for _ in 0..divisor {
        let (tx, rx) = mpsc::channel(STAGE_BUFFER);
        senders.push(tx);
        receivers.push(rx);
    }
    tokio::spawn(async move {
        let mut count: usize = 0;
        while let Some(chunk) = input.recv().await {
            let _ = senders[count % senders.len()].send(chunk).await;
            count += 1;
        }
    });
    receivers
}

/// Fan many input streams into one output stream. The output closes once
/// every input has closed; ordering across inputs is unspecified.
pub fn join(inputs: Vec<mpsc::Receiver<Chunk>>) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(chunk) = input.recv().await {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}

/// Read the stream until it closes, consigning its contents to the void.
pub fn consume(mut input: mpsc::Receiver<Chunk>) {
    tokio::spawn(async move { while input.recv().await.is_some() {} });
}

/// Basic statistics about the data that has passed through a [`counter`]
/// stage: total bytes seen, number of chunks, and time since the stage
/// started. Multiple counters in different pipeline regions can be
/// compared to find where throughput is lost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Count {
    /// Total bytes observed.
    pub bytes: u64,
    /// Total chunks observed.
    pub chunks: u64,
    /// Time elapsed since the counter stage started.
    pub elapsed: Duration,
}

impl Count {
    /// Rate of data flow in bytes per second.
    pub fn rate(&self) -> f64 {
        self.bytes as f64 / self.elapsed.as_secs_f64()
    }

    /// Rate of data flow in kilobytes per second.
    pub fn rate_kbps(&self) -> f64 {
        self.rate() / 1000.0
    }

    /// Rate of data flow in kibibytes per second.
    pub fn rate_kibps(&self) -> f64 {
        self.rate() / 1024.0
    }

    /// Rate of data flow in megabytes per second.
    pub fn rate_mbps(&self) -> f64 {
        self.rate_kbps() / 1000.0
    }

    /// Rate of data flow in mebibytes per second.
    pub fn rate_mibps(&self) -> f64 {
        self.rate_kibps() / 1024.0
    }
}

/// Pass chunks through while reporting a running [`Count`] after each
/// one. Be careful to drain the count stream, or it will block the flow
/// of data through this stage.
pub fn counter(
    mut input: mpsc::Receiver<Chunk>,
) -> (mpsc::Receiver<Chunk>, mpsc::Receiver<Count>) {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    let (count_tx, count_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let started: Instant = Instant::now();
        let mut current = Count::default();
        while let Some(chunk) = input.recv().await {
            current.bytes += chunk.size;
            current.chunks += 1;
            current.elapsed = started.elapsed();
            if tx.send(chunk).await.is_err() {
                break;
            }
            if count_tx.send(current).await.is_err() {
                break;
            }
        }
    });
    (rx, count_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: u64) -> Vec<Chunk> {
        (0..count)
            .map(|number| Chunk {
                number,
                size: 1,
                ..Chunk::default()
            })
            .collect()
    }

    async fn feed(chunks: Vec<Chunk>) -> mpsc::Receiver<Chunk> {
        let (tx, rx) = mpsc::channel(STAGE_BUFFER);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn collect(mut stream: mpsc::Receiver<Chunk>) -> Vec<Chunk> {
        let mut out: Vec<Chunk> = Vec::new();
        while let Some(chunk) = stream.recv().await {
            out.push(chunk);
        }
        out
    }

    fn error_channel() -> (mpsc::Sender<StageError>, mpsc::Receiver<StageError>) {
        mpsc::channel(64)
    }

    async fn drain_errors(mut errors: mpsc::Receiver<StageError>) -> usize {
        let mut count: usize = 0;
        while errors.recv().await.is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_map_transforms_chunks() {
        let (err_tx, err_rx) = error_channel();
        let input = feed(numbered(5)).await;
        let output = map(input, err_tx, |mut chunk| {
            chunk.object = format!("chunk-{}", chunk.number);
            Ok(chunk)
        });
        let chunks: Vec<Chunk> = collect(output).await;
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[3].object, "chunk-3");
        assert_eq!(drain_errors(err_rx).await, 0);
    }

    #[tokio::test]
    async fn test_map_drops_failing_chunks() {
        let (err_tx, err_rx) = error_channel();
        let input = feed(numbered(4)).await;
        let output = map(input, err_tx, |chunk| {
            if chunk.number % 2 == 0 {
                Err(StageError::MissingData {
                    number: chunk.number,
                })
            } else {
                Ok(chunk)
            }
        });
        assert_eq!(collect(output).await.len(), 2);
        assert_eq!(drain_errors(err_rx).await, 2);
    }

    #[tokio::test]
    async fn test_filter_keeps_matching_chunks() {
        let (err_tx, err_rx) = error_channel();
        let input = feed(numbered(10)).await;
        let output = filter(input, err_tx, |chunk| Ok(chunk.number < 3));
        assert_eq!(collect(output).await.len(), 3);
        assert_eq!(drain_errors(err_rx).await, 0);
    }

    #[tokio::test]
    async fn test_separate_routes_both_ways() {
        let (err_tx, err_rx) = error_channel();
        let input = feed(numbered(10)).await;
        let (evens, odds) = separate(input, err_tx, |chunk| Ok(chunk.number % 2 == 0));
        let evens_task = tokio::spawn(collect(evens));
        let odds: Vec<Chunk> = collect(odds).await;
        let evens: Vec<Chunk> = evens_task.await.unwrap();
        assert_eq!(evens.len(), 5);
        assert_eq!(odds.len(), 5);
        assert!(evens.iter().all(|chunk| chunk.number % 2 == 0));
        assert!(odds.iter().all(|chunk| chunk.number % 2 == 1));
        assert_eq!(drain_errors(err_rx).await, 0);
    }

    #[tokio::test]
    async fn test_fork_duplicates_chunks() {
        let input = feed(numbered(6)).await;
        let (a, b) = fork(input);
        let a_task = tokio::spawn(collect(a));
        let b: Vec<Chunk> = collect(b).await;
        let a: Vec<Chunk> = a_task.await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }

    #[tokio::test]
    async fn test_divide_round_robins_and_join_reunites() {
        let input = feed(numbered(9)).await;
        let outputs = divide(input, 3);
        assert_eq!(outputs.len(), 3);
        let rejoined = join(outputs);
        let mut numbers: Vec<u64> = collect(rejoined)
            .await
            .into_iter()
            .map(|chunk| chunk.number)
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (0..9).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_join_closes_after_all_inputs() {
        let a = feed(numbered(2)).await;
        let b = feed(numbered(3)).await;
        let joined = join(vec![a, b]);
        assert_eq!(collect(joined).await.len(), 5);
    }

    #[tokio::test]
    async fn test_counter_reports_running_totals() {
        let chunks: Vec<Chunk> = (0..4)
            .map(|number| Chunk {
                number,
                size: 10,
                ..Chunk::default()
            })
            .collect();
        let input = feed(chunks).await;
        let (output, mut counts) = counter(input);
        let drain = tokio::spawn(collect(output));
        let mut last = Count::default();
        while let Some(count) = counts.recv().await {
            last = count;
        }
        drain.await.unwrap();
        assert_eq!(last.chunks, 4);
        assert_eq!(last.bytes, 40);
    }

    #[tokio::test]
    async fn test_consume_drains_stream() {
        let (tx, rx) = mpsc::channel(STAGE_BUFFER);
        consume(rx);
        // With a consumer attached, sends beyond the buffer capacity succeed.
        for chunk in numbered(16) {
            tx.send(chunk).await.unwrap();
        }
    }
}
