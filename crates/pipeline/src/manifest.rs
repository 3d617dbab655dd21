//! Building and uploading SLO manifests from completed chunks.

use std::sync::Arc;

use tokio::sync::mpsc;

use swiftslo_common::{hash_bytes, MAX_MANIFEST_CHUNKS};
use swiftslo_destination::Destination;

use crate::chunk::{Chunk, ManifestEntry};
use crate::error::StageError;
use crate::stages::STAGE_BUFFER;

/// Aggregate completed chunks into SLO manifests.
///
/// The whole input is collected into a dense array keyed by chunk number,
/// so arrival order does not matter; a `join` upstream may interleave
/// freely. Once the input closes, one manifest chunk is emitted per
/// window of [`MAX_MANIFEST_CHUNKS`] source chunks, carrying:
///
/// - `number` - the window index
/// - `hash` - MD5 of the window's concatenated chunk hashes (the SLO
///   manifest ETag rule)
/// - `size` - the apparent size, the sum of the window's chunk sizes
/// - `data` - the manifest JSON body
///
/// Emitted manifests still need an object name and container before they
/// can be uploaded, which makes this stage reusable for the second
/// manifest level. A window with a slot no chunk ever filled is a sign
/// the upload is incomplete; the window produces an error instead of a
/// manifest with holes.
pub fn manifest_builder(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        let mut collected: Vec<Chunk> = Vec::new();
        while let Some(chunk) = input.recv().await {
            let slot: usize = chunk.number as usize;
            if slot >= collected.len() {
                collected.resize_with(slot + 1, Chunk::default);
            }
            collected[slot] = chunk;
        }

        for (number, window) in collected.chunks(MAX_MANIFEST_CHUNKS).enumerate() {
            let number: u64 = number as u64;
            if let Some(hole) = window
                .iter()
                .position(|chunk| chunk.hash.is_empty() || chunk.size == 0)
            {
                let _ = errors
                    .send(StageError::ManifestHole {
                        number,
                        missing: number * MAX_MANIFEST_CHUNKS as u64 + hole as u64,
                    })
                    .await;
                continue;
            }

            let etags: String = window.iter().map(|chunk| chunk.hash.as_str()).collect();
            let apparent_size: u64 = window.iter().map(|chunk| chunk.size).sum();
            let entries: Vec<ManifestEntry> = window.iter().map(ManifestEntry::from).collect();
            let data: Vec<u8> = match serde_json::to_vec(&entries) {
                Ok(data) => data,
                Err(err) => {
                    let _ = errors
                        .send(StageError::ManifestEncode {
                            number,
                            message: err.to_string(),
                        })
                        .await;
                    continue;
                }
            };

            let manifest = Chunk {
                number,
                hash: hash_bytes(etags.as_bytes()),
                size: apparent_size,
                data,
                ..Chunk::default()
            };
            if tx.send(manifest).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Upload each incoming chunk as an SLO manifest.
///
/// The destination performs the manifest-specific create, verifying that
/// the store computed the same ETag; a rejected manifest is dropped and
/// its error forwarded.
pub fn upload_manifests(
    mut input: mpsc::Receiver<Chunk>,
    errors: mpsc::Sender<StageError>,
    destination: Arc<dyn Destination>,
) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        while let Some(chunk) = input.recv().await {
            let result = destination
                .create_slo(&chunk.container, &chunk.object, &chunk.hash, &chunk.data)
                .await;
            match result {
                Ok(()) => {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(source) => {
                    let _ = errors
                        .send(StageError::ManifestUpload {
                            object: chunk.object.clone(),
                            source,
                        })
                        .await;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use swiftslo_destination::mock::{BufferDestination, ErrorDestination};

    use super::*;

    fn hashed_chunks(count: u64) -> Vec<Chunk> {
        (0..count)
            .map(|number| Chunk {
                number,
                object: format!("object-chunk-{number:04}-size-10"),
                container: "container".to_string(),
                hash: hash_bytes(number.to_string().as_bytes()),
                size: 10,
                offset: number * 10,
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

    #[tokio::test]
    async fn test_builder_single_window() {
        let chunks: Vec<Chunk> = hashed_chunks(3);
        let etags: String = chunks.iter().map(|chunk| chunk.hash.as_str()).collect();
        let (err_tx, _err_rx) = mpsc::channel(8);

        let manifests: Vec<Chunk> = collect(manifest_builder(feed(chunks).await, err_tx)).await;
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].number, 0);
        assert_eq!(manifests[0].size, 30);
        assert_eq!(manifests[0].hash, hash_bytes(etags.as_bytes()));

        let body: serde_json::Value = serde_json::from_slice(&manifests[0].data).unwrap();
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0]["path"],
            "container/object-chunk-0000-size-10".to_string()
        );
        assert_eq!(entries[1]["size_bytes"], 10);
    }

    #[tokio::test]
    async fn test_builder_windows_of_one_thousand() {
        let chunks: Vec<Chunk> = hashed_chunks(2500);
        let all: Vec<Chunk> = chunks.clone();
        let (err_tx, _err_rx) = mpsc::channel(8);

        let manifests: Vec<Chunk> = collect(manifest_builder(feed(chunks).await, err_tx)).await;
        assert_eq!(manifests.len(), 3);
        for (index, manifest) in manifests.iter().enumerate() {
            let window = &all[index * 1000..(1000 * (index + 1)).min(all.len())];
            let etags: String = window.iter().map(|chunk| chunk.hash.as_str()).collect();
            assert_eq!(manifest.number, index as u64);
            assert_eq!(manifest.size, window.iter().map(|chunk| chunk.size).sum::<u64>());
            assert_eq!(manifest.hash, hash_bytes(etags.as_bytes()));
        }
    }

    #[tokio::test]
    async fn test_builder_accepts_out_of_order_arrival() {
        let mut chunks: Vec<Chunk> = hashed_chunks(5);
        let expected_etags: String = chunks.iter().map(|chunk| chunk.hash.as_str()).collect();
        chunks.reverse();
        let (err_tx, _err_rx) = mpsc::channel(8);

        let manifests: Vec<Chunk> = collect(manifest_builder(feed(chunks).await, err_tx)).await;
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].hash, hash_bytes(expected_etags.as_bytes()));
    }

    #[tokio::test]
    async fn test_builder_reports_holes_instead_of_emitting() {
        let mut chunks: Vec<Chunk> = hashed_chunks(5);
        chunks.remove(2);
        let (err_tx, mut err_rx) = mpsc::channel(8);

        let manifests: Vec<Chunk> = collect(manifest_builder(feed(chunks).await, err_tx)).await;
        assert!(manifests.is_empty());
        assert!(matches!(
            err_rx.recv().await,
            Some(StageError::ManifestHole {
                number: 0,
                missing: 2,
            })
        ));
    }

    #[tokio::test]
    async fn test_upload_manifests_sends_to_destination() {
        let destination = BufferDestination::new();
        let manifest = Chunk {
            number: 0,
            object: "object-manifest-0000".to_string(),
            container: "container".to_string(),
            hash: "etag".to_string(),
            data: br#"[{"path":"c/o","etag":"x","size_bytes":1}]"#.to_vec(),
            size: 1,
            offset: 0,
        };
        let (err_tx, _err_rx) = mpsc::channel(8);
        let output = upload_manifests(
            feed(vec![manifest]).await,
            err_tx,
            Arc::new(destination.clone()),
        );
        assert_eq!(collect(output).await.len(), 1);

        let manifests = destination.manifests();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].name, "object-manifest-0000");
        assert_eq!(manifests[0].etag, "etag");
    }

    #[tokio::test]
    async fn test_upload_manifests_drops_rejected_manifests() {
        let manifest = Chunk {
            object: "object".to_string(),
            container: "container".to_string(),
            hash: "etag".to_string(),
            data: b"[]".to_vec(),
            size: 1,
            ..Chunk::default()
        };
        let (err_tx, mut err_rx) = mpsc::channel(8);
        let output = upload_manifests(feed(vec![manifest]).await, err_tx, Arc::new(ErrorDestination));
        assert!(collect(output).await.is_empty());
        assert!(matches!(
            err_rx.recv().await,
            Some(StageError::ManifestUpload { .. })
        ));
    }
}
