//! Shard RPC client.
//!
//! `ShardClient` is the per-replica RPC surface the coordinator consumes.
//! `HttpShardClient` speaks it as HTTP/1.1 + JSON, one connection per call,
//! with every request bounded by a timeout.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;
use tracing::debug;

use scrapegrid_core::{ApiResponse, RuntimeInfo, ScrapeStatusMap, TargetsByJob};

use crate::error::{ShardError, ShardResult};

const USER_AGENT: &str = "scrapegrid-coordinator/0.1";

pub const RUNTIME_PATH: &str = "/api/v1/shard/runtime";
pub const TARGETS_PATH: &str = "/api/v1/shard/targets";
pub const CONFIG_PATH: &str = "/api/v1/shard/config";

/// RPC surface of one shard replica.
#[async_trait]
pub trait ShardClient: Send + Sync {
    /// Endpoint this client talks to (for logs).
    fn address(&self) -> &str;

    /// Current load and applied config hash.
    async fn runtime(&self) -> ShardResult<RuntimeInfo>;

    /// Per-target status of everything the replica scrapes.
    async fn scrape_status(&self) -> ShardResult<ScrapeStatusMap>;

    /// Replace the replica's configuration with raw config bytes.
    async fn push_config(&self, raw: &[u8]) -> ShardResult<()>;

    /// Replace the replica's target assignment.
    async fn push_targets(&self, targets: &TargetsByJob) -> ShardResult<()>;
}

/// HTTP/JSON implementation of [`ShardClient`].
#[derive(Debug, Clone)]
pub struct HttpShardClient {
    address: String,
    timeout: Duration,
}

impl HttpShardClient {
    /// Create a client for `host:port`.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    async fn request(&self, method: Method, path: &str, body: Bytes) -> ShardResult<Bytes> {
        let address = self.address.as_str();

        let exchange = async {
            let stream = tokio::net::TcpStream::connect(address)
                .await
                .map_err(|e| self.transport(e))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| self.transport(e))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "shard connection closed with error");
                }
            });

            let req = Request::builder()
                .method(method)
                .uri(path)
                .header("host", address)
                .header("user-agent", USER_AGENT)
                .header("content-type", "application/json")
                .body(Full::new(body))
                .map_err(|e| self.transport(e))?;

            let resp = sender.send_request(req).await.map_err(|e| self.transport(e))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| self.transport(e))?
                .to_bytes();

            if !status.is_success() {
                return Err(ShardError::Status {
                    address: address.to_string(),
                    status: status.as_u16(),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Ok(bytes)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ShardError::Timeout {
                address: address.to_string(),
            }),
        }
    }

    fn transport(&self, e: impl std::fmt::Display) -> ShardError {
        ShardError::Transport {
            address: self.address.clone(),
            reason: e.to_string(),
        }
    }

    fn encode<T: serde::Serialize>(&self, value: &T) -> ShardResult<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| ShardError::Decode {
                address: self.address.clone(),
                reason: e.to_string(),
            })
    }
}

/// Decode an `ApiResponse<T>` body, requiring a payload.
pub(crate) fn decode_data<T: DeserializeOwned>(address: &str, bytes: &[u8]) -> ShardResult<T> {
    decode_envelope::<T>(address, bytes)?.ok_or_else(|| ShardError::Decode {
        address: address.to_string(),
        reason: "response has no data".to_string(),
    })
}

/// Decode an `ApiResponse<T>` body; `success=false` becomes a status error.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    address: &str,
    bytes: &[u8],
) -> ShardResult<Option<T>> {
    let envelope: ApiResponse<T> =
        serde_json::from_slice(bytes).map_err(|e| ShardError::Decode {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
    envelope.into_result().map_err(|message| ShardError::Status {
        address: address.to_string(),
        status: 200,
        message,
    })
}

#[async_trait]
impl ShardClient for HttpShardClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn runtime(&self) -> ShardResult<RuntimeInfo> {
        let bytes = self.request(Method::GET, RUNTIME_PATH, Bytes::new()).await?;
        decode_data(&self.address, &bytes)
    }

    async fn scrape_status(&self) -> ShardResult<ScrapeStatusMap> {
        let bytes = self.request(Method::GET, TARGETS_PATH, Bytes::new()).await?;
        decode_data(&self.address, &bytes)
    }

    async fn push_config(&self, raw: &[u8]) -> ShardResult<()> {
        let bytes = self
            .request(Method::POST, CONFIG_PATH, Bytes::copy_from_slice(raw))
            .await?;
        decode_envelope::<serde_json::Value>(&self.address, &bytes).map(|_| ())
    }

    async fn push_targets(&self, targets: &TargetsByJob) -> ShardResult<()> {
        let body = self.encode(targets)?;
        let bytes = self.request(Method::POST, TARGETS_PATH, body).await?;
        decode_envelope::<serde_json::Value>(&self.address, &bytes).map(|_| ())
    }
}
