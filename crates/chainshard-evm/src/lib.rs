//! chainshard-evm — EVM side of the ingestion engine.
//!
//! - [`source`] / [`http`] — the `LogSource` trait and its JSON-RPC client
//! - [`fetcher`] — fetch-with-retry over one block window
//! - [`decoder`] — raw log → `DecodedEvent` through alloy's dynamic ABI
//! - [`worker`] / [`coordinator`] — per-shard workers on a bounded pool
//! - [`builder`] — fluent `JobBuilder`

pub mod builder;
pub mod coordinator;
pub mod decoder;
pub mod fetcher;
pub mod http;
pub mod normalizer;
pub mod policy;
pub mod request;
pub mod source;
pub mod worker;

pub use builder::JobBuilder;
pub use coordinator::{resume_hint, Coordinator, FailedRange, JobState, JobSummary};
pub use decoder::EventDecoder;
pub use fetcher::RetryingFetcher;
pub use http::{HttpLogSource, HttpSourceConfig};
pub use policy::{RateLimiter, RateLimiterConfig, RetryPolicy};
pub use source::{LogFilter, LogQuery, LogSource, RawLog, RpcError};
pub use worker::{ShardWorker, WorkerReport, WorkerSettings};
