//! Log source abstraction over the `eth_getLogs` query interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use chainshard_core::types::BlockWindow;

use crate::request::JsonRpcError;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    /// `None` for pending logs.
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: Option<String>,
    #[serde(rename = "logIndex", default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Block number, if present and well-formed.
    pub fn block_number_u64(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_hex_u64)
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Which logs to ask for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Contract address; `None` matches every emitter.
    pub address: Option<String>,
    /// Accepted `topics[0]` values (OR). Empty matches every event.
    pub topic0: Vec<String>,
}

impl LogFilter {
    pub fn new(address: Option<String>, topic0: Vec<String>) -> Self {
        Self { address, topic0 }
    }
}

/// One `eth_getLogs` call with inclusive bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub from_block: u64,
    pub to_block: u64,
    pub filter: LogFilter,
}

impl LogQuery {
    /// Query covering a half-open window: `[start, end - 1]` inclusive.
    pub fn for_window(window: BlockWindow, filter: &LogFilter) -> Self {
        let (from_block, to_block) = window.inclusive_bounds();
        Self {
            from_block,
            to_block,
            filter: filter.clone(),
        }
    }

    /// The `eth_getLogs` filter object.
    pub fn to_params(&self) -> Value {
        let mut obj = json!({
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
        });
        if let Some(address) = &self.filter.address {
            obj["address"] = json!(address);
        }
        if !self.filter.topic0.is_empty() {
            obj["topics"] = json!([self.filter.topic0]);
        }
        obj
    }
}

/// Errors from a single RPC call.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport failure. `status` is `None` when no response arrived.
    #[error("HTTP error (status {status:?}): {message}")]
    Http { status: Option<u16>, message: String },

    #[error("request timed out")]
    Timeout,

    /// Error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Returns `true` if the call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(code), ..
            } => *code == 429 || *code == 408 || *code >= 500,
            // -32005: limit exceeded, -32603: internal error, -32000 is used
            // by several providers for "header not found" on fresh blocks.
            Self::Rpc(err) => {
                matches!(err.code, -32005 | -32603)
                    || (err.code == -32000 && err.message.contains("header not found"))
                    || err.message.to_ascii_lowercase().contains("rate limit")
            }
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Trait for the remote log-query interface.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch logs in `[query.from_block, query.to_block]` matching the filter.
    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, RpcError>;

    /// Latest block number.
    async fn head_block(&self) -> Result<u64, RpcError>;
}

/// Parse a hex-encoded quantity (with or without `0x`).
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("1234"), Some(0x1234));
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn raw_log_from_json() {
        let log: RawLog = serde_json::from_str(
            r#"{
                "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
                "data": "0x",
                "blockNumber": "0x408",
                "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000aa",
                "logIndex": "0x5",
                "removed": false
            }"#,
        )
        .unwrap();
        assert_eq!(log.block_number_u64(), Some(1032));
        assert!(!log.is_removed());
        assert!(log.block_hash.is_none());
    }

    #[test]
    fn window_query_uses_inclusive_bounds() {
        let filter = LogFilter::new(
            Some("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".into()),
            vec!["0xddf2".into()],
        );
        let q = LogQuery::for_window(BlockWindow::new(1000, 1020), &filter);
        assert_eq!((q.from_block, q.to_block), (1000, 1019));

        let params = q.to_params();
        assert_eq!(params["fromBlock"], "0x3e8");
        assert_eq!(params["toBlock"], "0x3fb");
        assert_eq!(params["topics"][0][0], "0xddf2");
        assert_eq!(params["address"], "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }

    #[test]
    fn retryable_classification() {
        assert!(RpcError::Timeout.is_retryable());
        assert!(RpcError::Http { status: None, message: "connection refused".into() }.is_retryable());
        assert!(RpcError::Http { status: Some(429), message: String::new() }.is_retryable());
        assert!(RpcError::Http { status: Some(503), message: String::new() }.is_retryable());
        assert!(!RpcError::Http { status: Some(400), message: String::new() }.is_retryable());
        assert!(!RpcError::InvalidResponse("bad json".into()).is_retryable());

        let rpc = |code, message: &str| {
            RpcError::Rpc(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            })
        };
        assert!(rpc(-32005, "limit exceeded").is_retryable());
        assert!(!rpc(-32602, "invalid params").is_retryable());
        assert!(rpc(-32000, "header not found").is_retryable());
        assert!(!rpc(-32000, "execution reverted").is_retryable());
    }
}
