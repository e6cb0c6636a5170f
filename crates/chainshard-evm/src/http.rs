//! HTTP JSON-RPC log source backed by `reqwest`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::policy::{RateLimiter, RateLimiterConfig};
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::source::{parse_hex_u64, LogQuery, LogSource, RawLog, RpcError};

/// Configuration for `HttpLogSource`.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub request_timeout: Duration,
    /// Client-side request budget; `None` disables the limiter.
    pub rate_limit: Option<RateLimiterConfig>,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(40),
            rate_limit: None,
        }
    }
}

/// `LogSource` talking to a JSON-RPC endpoint over HTTP.
///
/// Each call is a single attempt; retries belong to `RetryingFetcher`.
pub struct HttpLogSource {
    url: String,
    http: reqwest::Client,
    rate_limiter: Option<RateLimiter>,
    next_id: AtomicU64,
}

impl HttpLogSource {
    /// Create a source for the given endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpSourceConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Http {
                status: None,
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            url: url.into(),
            http,
            rate_limiter: config.rate_limit.map(RateLimiter::new),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T, RpcError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, &params);
        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(classify_reqwest)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http {
                status: Some(status),
                message: body,
            });
        }

        // a body cut short is a transport failure; only unparseable bytes
        // are an invalid response
        let bytes = resp.bytes().await.map_err(classify_reqwest)?;
        let body: JsonRpcResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))?;
        let result = body.into_result().map_err(RpcError::Rpc)?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))
    }
}

fn classify_reqwest(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout
    } else if e.is_decode() {
        RpcError::InvalidResponse(e.to_string())
    } else {
        RpcError::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, RpcError> {
        tracing::trace!(
            from = query.from_block,
            to = query.to_block,
            url = %self.url,
            "eth_getLogs"
        );
        let logs: Option<Vec<RawLog>> = self.call("eth_getLogs", vec![query.to_params()]).await?;
        Ok(logs.unwrap_or_default())
    }

    async fn head_block(&self) -> Result<u64, RpcError> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| RpcError::InvalidResponse(format!("bad block number '{hex}'")))
    }
}
