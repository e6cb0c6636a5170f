//! chainshard-core — foundation for the chunked, resumable event ingestion engine.
//!
//! # Architecture
//!
//! ```text
//! Coordinator ─ plan_shards ─▶ one worker per shard-aligned sub-range
//!                                 ├── plan_windows   (query-sized windows)
//!                                 ├── fetch + retry  (chainshard-evm)
//!                                 ├── EventDecoder   (chainshard-evm)
//!                                 └── ShardStore     (checkpoint + atomic commit)
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod planner;
pub mod schema;
pub mod store;
pub mod types;

pub use config::{JobConfig, RetrySettings};
pub use error::{
    DecodeError, ErrorKind, FetchError, IngestError, SchemaError, StoreError, WorkerError,
};
pub use event::{DecodedEvent, FieldValue, ShardRow};
pub use planner::{plan_shards, plan_windows, ShardPlan, WindowPlan};
pub use schema::{load_schema, EventField, EventSchema, FieldType};
pub use store::{merge_rows, rows_for_shard, ShardStore, ShardWriter};
pub use types::{BlockWindow, JobPlan, ShardKey};
