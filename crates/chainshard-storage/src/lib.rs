//! chainshard-storage — shard store backends for ChainShard.
//!
//! Backends:
//! - [`memory`] — in-memory (tests and dry runs, no persistence)
//! - [`parquet_store`] — one Parquet file per shard, replaced atomically on commit

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "parquet")]
pub mod parquet_store;

#[cfg(feature = "memory")]
pub use memory::MemoryShardStore;

#[cfg(feature = "parquet")]
pub use parquet_store::{read_shard_file, ParquetShardStore, ShardFile};
