//! OpenStack Swift implementation of the [`Destination`] trait.
//!
//! Talks to a Swift-compatible store through its storage URL with a
//! pre-negotiated auth token. Object bodies are streamed to the store as
//! they are written, so a handle never buffers a whole chunk; SLO and DLO
//! manifests use the store's dedicated manifest endpoints.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::destination::{Destination, ObjectRecord, ObjectWriter};
use crate::error::DestinationError;

/// How many body buffers may be in flight between a writer and its
/// request task before `write` applies backpressure.
const BODY_CHANNEL_DEPTH: usize = 4;

/// One entry of a `?format=json` container listing.
#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    bytes: u64,
}

/// [`Destination`] backed by an OpenStack Swift storage endpoint.
pub struct SwiftDestination {
    client: Client,
    storage_url: String,
    auth_token: String,
}

impl SwiftDestination {
    /// Create a destination for a storage URL and auth token.
    ///
    /// Authentication itself happens elsewhere; this type only needs the
    /// resulting token and account storage URL.
    pub fn new(
        storage_url: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self, DestinationError> {
        let client: Client = Client::builder()
            .build()
            .map_err(|err| DestinationError::Network {
                message: err.to_string(),
            })?;
        let storage_url: String = storage_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            storage_url,
            auth_token: auth_token.into(),
        })
    }

    fn object_url(&self, container: &str, object: &str) -> String {
        format!("{}/{}/{}", self.storage_url, container, object)
    }

    fn put(&self, url: String) -> RequestBuilder {
        self.client.put(url).header("X-Auth-Token", &self.auth_token)
    }
}

/// Read the ETag a response carries, with its surrounding quotes stripped.
fn response_etag(response: &Response) -> Option<String> {
    response
        .headers()
        .get("Etag")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_matches('"').to_string())
}

async fn rejection(object: String, response: Response) -> DestinationError {
    let status: u16 = response.status().as_u16();
    let body: String = response.text().await.unwrap_or_default();
    DestinationError::Rejected {
        object,
        status,
        body,
    }
}

#[async_trait]
impl Destination for SwiftDestination {
    async fn create_file(
        &self,
        container: &str,
        object: &str,
        check_hash: bool,
        hash: &str,
    ) -> Result<Box<dyn ObjectWriter>, DestinationError> {
        let (sender, receiver) = mpsc::channel::<Result<Bytes, io::Error>>(BODY_CHANNEL_DEPTH);
        let body_stream = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|buffer| (buffer, receiver))
        });

        let mut request: RequestBuilder = self.put(self.object_url(container, object));
        let expected: Option<String> = if check_hash && !hash.is_empty() {
            request = request.header("ETag", hash);
            Some(hash.to_string())
        } else {
            None
        };
        let request = request.body(Body::wrap_stream(body_stream));

        debug!(container, object, "starting object upload");
        let object_name: String = object.to_string();
        let task: JoinHandle<Result<(), DestinationError>> = tokio::spawn(async move {
            let response = request.send().await.map_err(|err| DestinationError::Network {
                message: err.to_string(),
            })?;
            if !response.status().is_success() {
                return Err(rejection(object_name, response).await);
            }
            if let (Some(expected), Some(actual)) = (expected, response_etag(&response)) {
                if actual != expected {
                    return Err(DestinationError::HashMismatch {
                        object: object_name,
                        expected,
                        actual,
                    });
                }
            }
            Ok(())
        });

        Ok(Box::new(SwiftObjectWriter {
            sender: Some(sender),
            task,
        }))
    }

    async fn create_slo(
        &self,
        container: &str,
        manifest_name: &str,
        manifest_etag: &str,
        manifest_json: &[u8],
    ) -> Result<(), DestinationError> {
        let url: String = format!(
            "{}?multipart-manifest=put",
            self.object_url(container, manifest_name)
        );
        debug!(container, manifest_name, "uploading SLO manifest");
        let response = self
            .put(url)
            .header("Content-Length", manifest_json.len())
            .body(manifest_json.to_vec())
            .send()
            .await
            .map_err(|err| DestinationError::Network {
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(rejection(manifest_name.to_string(), response).await);
        }
        let actual: String = response_etag(&response).unwrap_or_default();
        if actual != manifest_etag {
            return Err(DestinationError::ManifestCorrupted {
                expected: manifest_etag.to_string(),
                actual,
            });
        }
        Ok(())
    }

    async fn create_dlo(
        &self,
        manifest_container: &str,
        manifest_name: &str,
        object_container: &str,
        prefix: &str,
    ) -> Result<(), DestinationError> {
        let url: String = self.object_url(manifest_container, manifest_name);
        debug!(manifest_container, manifest_name, "uploading DLO manifest");
        let response = self
            .put(url)
            .header("X-Object-Manifest", format!("{object_container}/{prefix}"))
            .send()
            .await
            .map_err(|err| DestinationError::Network {
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(rejection(manifest_name.to_string(), response).await);
        }
        Ok(())
    }

    async fn objects(&self, container: &str) -> Result<Vec<ObjectRecord>, DestinationError> {
        let url: String = format!("{}/{}?format=json", self.storage_url, container);
        let response = self
            .client
            .get(url)
            .header("X-Auth-Token", &self.auth_token)
            .send()
            .await
            .map_err(|err| DestinationError::ListFailed {
                container: container.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(DestinationError::ListFailed {
                container: container.to_string(),
                message: format!("listing returned status {}", response.status()),
            });
        }
        let listed: Vec<ListedObject> =
            response
                .json()
                .await
                .map_err(|err| DestinationError::ListFailed {
                    container: container.to_string(),
                    message: err.to_string(),
                })?;
        Ok(listed
            .into_iter()
            .map(|entry| ObjectRecord {
                name: entry.name,
                hash: entry.hash,
                bytes: entry.bytes,
            })
            .collect())
    }
}

/// Streams written bytes into an in-flight PUT request.
struct SwiftObjectWriter {
    sender: Option<mpsc::Sender<Result<Bytes, io::Error>>>,
    task: JoinHandle<Result<(), DestinationError>>,
}

#[async_trait]
impl ObjectWriter for SwiftObjectWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, DestinationError> {
        let sender = self.sender.as_ref().ok_or_else(|| DestinationError::Other {
            message: "write on a closed object handle".to_string(),
        })?;
        sender
            .send(Ok(Bytes::copy_from_slice(buf)))
            .await
            .map_err(|_| DestinationError::Network {
                message: "upload request ended before the body was complete".to_string(),
            })?;
        Ok(buf.len())
    }

    async fn close(self: Box<Self>) -> Result<(), DestinationError> {
        let SwiftObjectWriter { sender, task } = *self;
        // Ending the body stream lets the request complete.
        drop(sender);
        match task.await {
            Ok(result) => result,
            Err(err) => Err(DestinationError::Other {
                message: format!("upload task failed: {err}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_entry_parses_swift_json() {
        let raw = r#"[
            {"name": "data-chunk-0000-size-10", "hash": "0abc", "bytes": 10,
             "content_type": "application/octet-stream",
             "last_modified": "2016-09-16T13:20:49.000000"},
            {"name": "data"}
        ]"#;
        let listed: Vec<ListedObject> = serde_json::from_str(raw).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "data-chunk-0000-size-10");
        assert_eq!(listed[0].hash, "0abc");
        assert_eq!(listed[0].bytes, 10);
        assert_eq!(listed[1].hash, "");
        assert_eq!(listed[1].bytes, 0);
    }

    #[test]
    fn test_storage_url_trailing_slash_is_trimmed() {
        let dest: SwiftDestination =
            SwiftDestination::new("https://example.com/v1/AUTH_account/", "token").unwrap();
        assert_eq!(
            dest.object_url("container", "object"),
            "https://example.com/v1/AUTH_account/container/object"
        );
    }
}
