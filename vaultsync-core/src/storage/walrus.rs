//! HTTP adapter for a Walrus publisher/aggregator pair.

use super::{BlobId, BlobStore};
use crate::{Result, VaultSyncError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Walrus endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalrusConfig {
    /// Publisher base URL (writes)
    pub publisher_url: String,
    /// Aggregator base URL (reads)
    pub aggregator_url: String,
    /// Storage duration requested for new blobs
    pub epochs: u32,
    pub timeout_secs: u64,
    /// Largest payload sent to the publisher, in bytes
    pub max_blob_size: usize,
}

impl Default for WalrusConfig {
    fn default() -> Self {
        Self {
            publisher_url: "https://publisher.walrus-testnet.walrus.space".to_string(),
            aggregator_url: "https://aggregator.walrus-testnet.walrus.space".to_string(),
            epochs: 5,
            timeout_secs: 30,
            max_blob_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

/// Blob store client speaking the Walrus HTTP API
pub struct WalrusClient {
    client: reqwest::Client,
    config: WalrusConfig,
}

impl WalrusClient {
    pub fn new(config: WalrusConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VaultSyncError::Storage(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: WalrusConfig {
                publisher_url: config.publisher_url.trim_end_matches('/').to_string(),
                aggregator_url: config.aggregator_url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    pub fn config(&self) -> &WalrusConfig {
        &self.config
    }

    // Ids arrive from the pointer record; only url-safe ones may reach the path
    fn blob_url(&self, id: &BlobId) -> Result<String> {
        if !id.is_well_formed() {
            return Err(VaultSyncError::NotFound(format!("Blob {}", id)));
        }
        Ok(format!("{}/v1/blobs/{}", self.config.aggregator_url, id))
    }
}

#[async_trait]
impl BlobStore for WalrusClient {
    async fn put(&self, data: &[u8]) -> Result<BlobId> {
        if data.len() > self.config.max_blob_size {
            return Err(VaultSyncError::PayloadTooLarge { size: data.len() });
        }

        let url = format!(
            "{}/v1/blobs?epochs={}",
            self.config.publisher_url, self.config.epochs
        );
        let resp = self
            .client
            .put(&url)
            .header("Content-Type", "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| request_error("store", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(status_error(status, "store", &body, data.len()));
        }

        let body: StoreResponse = resp
            .json()
            .await
            .map_err(|e| VaultSyncError::Remote(format!("Invalid store response: {}", e)))?;

        match (body.newly_created, body.already_certified) {
            (Some(created), _) => {
                debug!("Stored new blob {}", created.blob_object.blob_id);
                Ok(BlobId::new(created.blob_object.blob_id))
            }
            (None, Some(certified)) => {
                debug!("Blob {} already certified", certified.blob_id);
                Ok(BlobId::new(certified.blob_id))
            }
            (None, None) => Err(VaultSyncError::Remote(
                "Store response carries no blob id".to_string(),
            )),
        }
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.blob_url(id)?)
            .send()
            .await
            .map_err(|e| request_error("read", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(VaultSyncError::NotFound(format!("Blob {}", id)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(status_error(status, "read", &body, 0));
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| request_error("read", e))
    }

    async fn exists(&self, id: &BlobId) -> Result<bool> {
        let Ok(url) = self.blob_url(id) else {
            return Ok(false);
        };
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| request_error("exists", e))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(s, "exists", "", 0)),
        }
    }
}

fn request_error(op: &str, e: reqwest::Error) -> VaultSyncError {
    if e.is_timeout() {
        VaultSyncError::Timeout(format!("blob {}: {}", op, e))
    } else {
        VaultSyncError::Transient(format!("blob {}: {}", op, e))
    }
}

fn status_error(status: StatusCode, op: &str, body: &str, size: usize) -> VaultSyncError {
    match status {
        StatusCode::NOT_FOUND => VaultSyncError::NotFound(format!("blob {}: {}", op, body)),
        StatusCode::PAYLOAD_TOO_LARGE => VaultSyncError::PayloadTooLarge { size },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            VaultSyncError::Transient(format!("blob {} {}: {}", op, status, body))
        }
        s if s.is_server_error() => {
            VaultSyncError::Transient(format!("blob {} {}: {}", op, status, body))
        }
        _ => VaultSyncError::Remote(format!("blob {} {}: {}", op, status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> WalrusClient {
        WalrusClient::new(WalrusConfig {
            publisher_url: format!("{}/", server.url()),
            aggregator_url: server.url(),
            epochs: 3,
            timeout_secs: 5,
            max_blob_size: 1024,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn put_newly_created() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", Matcher::Regex("^/v1/blobs".to_string()))
            .match_query(Matcher::UrlEncoded("epochs".into(), "3".into()))
            .match_body(Matcher::Exact("payload".to_string()))
            .with_status(200)
            .with_body(r#"{"newlyCreated":{"blobObject":{"blobId":"abc123","size":7}}}"#)
            .create_async()
            .await;

        let id = client_for(&server).put(b"payload").await.unwrap();
        assert_eq!(id, BlobId::new("abc123"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn put_already_certified_is_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", Matcher::Regex("^/v1/blobs".to_string()))
            .with_status(200)
            .with_body(r#"{"alreadyCertified":{"blobId":"abc123","endEpoch":42}}"#)
            .create_async()
            .await;

        let id = client_for(&server).put(b"payload").await.unwrap();
        assert_eq!(id, BlobId::new("abc123"));
    }

    #[tokio::test]
    async fn put_maps_error_statuses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", Matcher::Regex("^/v1/blobs".to_string()))
            .with_status(413)
            .create_async()
            .await;
        let err = client_for(&server).put(b"payload").await.unwrap_err();
        assert!(matches!(err, VaultSyncError::PayloadTooLarge { size: 7 }));
        assert!(!err.is_retryable());

        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", Matcher::Regex("^/v1/blobs".to_string()))
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;
        let err = client_for(&server).put(b"payload").await.unwrap_err();
        assert!(matches!(err, VaultSyncError::Transient(_)));
        assert!(err.is_retryable());

        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", Matcher::Regex("^/v1/blobs".to_string()))
            .with_status(400)
            .create_async()
            .await;
        let err = client_for(&server).put(b"payload").await.unwrap_err();
        assert!(matches!(err, VaultSyncError::Remote(_)));
    }

    #[tokio::test]
    async fn put_rejects_oversized_payload_without_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = client_for(&server).put(&[0u8; 2048]).await.unwrap_err();
        assert!(matches!(err, VaultSyncError::PayloadTooLarge { size: 2048 }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_blob_and_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/blobs/abc123")
            .with_status(200)
            .with_body(b"ciphertext")
            .create_async()
            .await;
        server
            .mock("GET", "/v1/blobs/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.get(&BlobId::new("abc123")).await.unwrap(),
            b"ciphertext"
        );
        assert!(matches!(
            client.get(&BlobId::new("missing")).await,
            Err(VaultSyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn exists_uses_head() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/v1/blobs/abc123")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("HEAD", "/v1/blobs/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(client.exists(&BlobId::new("abc123")).await.unwrap());
        assert!(!client.exists(&BlobId::new("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_ids_never_reach_the_aggregator() {
        let mut server = mockito::Server::new_async().await;
        let get = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let head = server
            .mock("HEAD", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server);
        for raw in ["../admin", "abc?epochs=1", "a/b", ""] {
            let id = BlobId::new(raw);
            assert!(matches!(
                client.get(&id).await,
                Err(VaultSyncError::NotFound(_))
            ));
            assert!(!client.exists(&id).await.unwrap());
        }
        get.assert_async().await;
        head.assert_async().await;
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let client = WalrusClient::new(WalrusConfig {
            publisher_url: "http://127.0.0.1:1".to_string(),
            aggregator_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..WalrusConfig::default()
        })
        .unwrap();

        let err = client.put(b"payload").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
