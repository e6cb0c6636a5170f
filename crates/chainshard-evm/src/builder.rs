//! Fluent builder API for ingestion jobs.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainshard_core::schema::EventSchema;
//! use chainshard_evm::{HttpLogSource, HttpSourceConfig, JobBuilder};
//! use chainshard_storage::ParquetShardStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = EventSchema::from_solidity(
//!     "event Transfer(address indexed from, address indexed to, uint256 value);",
//! )?;
//! let source = HttpLogSource::new("http://localhost:8545", HttpSourceConfig::default())?;
//! let coordinator = JobBuilder::new(schema)
//!     .source(Arc::new(source))
//!     .store(Arc::new(ParquetShardStore::new("output")?))
//!     .address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")
//!     .range(19_000_000, 19_100_000)
//!     .window_size(2_000)
//!     .shard_size(50_000)
//!     .concurrency(4)
//!     .build()?;
//! let summary = coordinator.run().await?;
//! println!("{}", summary.state);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use chainshard_core::config::JobConfig;
use chainshard_core::error::IngestError;
use chainshard_core::schema::EventSchema;
use chainshard_core::store::ShardStore;

use crate::coordinator::{Coordinator, JobState};
use crate::decoder::EventDecoder;
use crate::fetcher::RetryingFetcher;
use crate::policy::RetryPolicy;
use crate::source::{LogFilter, LogSource};

/// Fluent builder for a `Coordinator`.
pub struct JobBuilder {
    schema: EventSchema,
    config: JobConfig,
    source: Option<Arc<dyn LogSource>>,
    store: Option<Arc<dyn ShardStore>>,
    retry: Option<RetryPolicy>,
    cancel: Option<CancellationToken>,
}

impl JobBuilder {
    pub fn new(schema: EventSchema) -> Self {
        Self::from_config(&JobConfig::default(), schema)
    }

    /// Start from a loaded `JobConfig`; later calls override its values.
    pub fn from_config(config: &JobConfig, schema: EventSchema) -> Self {
        Self {
            schema,
            config: config.clone(),
            source: None,
            store: None,
            retry: None,
            cancel: None,
        }
    }

    pub fn source(mut self, source: Arc<dyn LogSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn ShardStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the half-open block range `[from, to)`.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.config.from_block = Some(from);
        self.config.to_block = Some(to);
        self
    }

    /// Set the number of blocks per `eth_getLogs` call.
    pub fn window_size(mut self, size: u64) -> Self {
        self.config.window_size = size;
        self
    }

    pub fn shard_size(mut self, size: u64) -> Self {
        self.config.shard_size = size;
        self
    }

    /// Set the maximum number of concurrent workers.
    pub fn concurrency(mut self, n: u32) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.config.resume = resume;
        self
    }

    /// Set the shard file prefix (defaults to the lowercased event name).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    /// Only ingest logs emitted by this contract.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = Some(address.into());
        self
    }

    /// Commit every `n` windows.
    pub fn flush_every_windows(mut self, n: u32) -> Self {
        self.config.flush_every_windows = n;
        self
    }

    /// Override the retry policy derived from the config.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate the job and build the `Coordinator`.
    pub fn build(self) -> Result<Coordinator, IngestError> {
        let plan = self.config.to_plan()?;
        let source = self
            .source
            .ok_or_else(|| IngestError::Config("no log source configured".into()))?;
        let store = self
            .store
            .ok_or_else(|| IngestError::Config("no shard store configured".into()))?;

        let prefix = self.config.prefix_for(&self.schema);
        let policy = self
            .retry
            .unwrap_or_else(|| RetryPolicy::from(&self.config.retry));
        let decoder = EventDecoder::new([self.schema.clone()]);
        let filter = LogFilter::new(self.config.address.clone(), decoder.topic0s());

        Ok(Coordinator {
            plan,
            prefix,
            schema: Arc::new(self.schema),
            decoder: Arc::new(decoder),
            fetcher: RetryingFetcher::new(source, policy),
            store,
            filter: Arc::new(filter),
            flush_every_windows: self.config.flush_every_windows,
            cancel: self.cancel.unwrap_or_default(),
            state: Mutex::new(JobState::Planning),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainshard_core::error::StoreError;
    use chainshard_core::schema::{EventField, FieldType};
    use chainshard_core::store::ShardWriter;
    use chainshard_core::types::{BlockWindow, ShardKey};

    use crate::source::{LogQuery, RawLog, RpcError};

    struct NoLogs;

    #[async_trait]
    impl LogSource for NoLogs {
        async fn get_logs(&self, _query: &LogQuery) -> Result<Vec<RawLog>, RpcError> {
            Ok(Vec::new())
        }

        async fn head_block(&self) -> Result<u64, RpcError> {
            Ok(0)
        }
    }

    struct NoStore;

    #[async_trait]
    impl ShardStore for NoStore {
        async fn open(
            &self,
            key: &ShardKey,
            _schema: &EventSchema,
        ) -> Result<Box<dyn ShardWriter>, StoreError> {
            Err(StoreError::Task(format!("not opening {key}")))
        }
    }

    fn approval() -> EventSchema {
        EventSchema::new(
            "Approval",
            vec![
                EventField::new("owner", FieldType::Address, true),
                EventField::new("spender", FieldType::Address, true),
                EventField::new("value", FieldType::Uint(256), false),
            ],
        )
        .unwrap()
    }

    #[test]
    fn builder_custom() {
        let coordinator = JobBuilder::new(approval())
            .source(Arc::new(NoLogs))
            .store(Arc::new(NoStore))
            .range(1_000, 1_050)
            .window_size(20)
            .shard_size(50)
            .concurrency(1)
            .resume(true)
            .build()
            .unwrap();

        let plan = coordinator.plan();
        assert_eq!(plan.full_range, BlockWindow::new(1_000, 1_050));
        assert_eq!(plan.window_size, 20);
        assert_eq!(plan.shard_size, 50);
        assert_eq!(plan.concurrency, 1);
        assert!(plan.resume);
        assert_eq!(coordinator.prefix(), "approval");
        assert_eq!(coordinator.state(), JobState::Planning);
    }

    #[test]
    fn filter_carries_address_and_signature() {
        let coordinator = JobBuilder::new(approval())
            .source(Arc::new(NoLogs))
            .store(Arc::new(NoStore))
            .range(0, 10)
            .address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")
            .prefix("usdc_approval")
            .build()
            .unwrap();
        assert_eq!(coordinator.prefix(), "usdc_approval");
        assert_eq!(
            coordinator.filter.address.as_deref(),
            Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")
        );
        assert_eq!(coordinator.filter.topic0, vec![approval().signature_hex()]);
    }

    #[test]
    fn missing_parts_are_config_errors() {
        let err = JobBuilder::new(approval()).range(0, 10).store(Arc::new(NoStore)).build();
        assert!(matches!(err, Err(IngestError::Config(_))));

        let err = JobBuilder::new(approval()).range(0, 10).source(Arc::new(NoLogs)).build();
        assert!(matches!(err, Err(IngestError::Config(_))));
    }

    #[test]
    fn invalid_range_is_rejected() {
        let err = JobBuilder::new(approval())
            .source(Arc::new(NoLogs))
            .store(Arc::new(NoStore))
            .range(10, 10)
            .build();
        assert!(matches!(err, Err(IngestError::InvalidPlan(_))));

        let err = JobBuilder::new(approval())
            .source(Arc::new(NoLogs))
            .store(Arc::new(NoStore))
            .range(0, 10)
            .window_size(0)
            .build();
        assert!(matches!(err, Err(IngestError::InvalidPlan(_))));
    }
}
