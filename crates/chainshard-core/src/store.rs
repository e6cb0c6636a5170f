//! Shard store traits.
//!
//! A shard is the ordered, de-duplicated set of rows whose block number lies
//! in `[shard_start, shard_end)`. Exactly one worker holds a writer for a
//! given shard at a time; each commit replaces the persisted shard as a
//! whole, so readers never observe a partial write.
//!
//! Implementations: `ParquetShardStore` and `MemoryShardStore` in
//! `chainshard-storage`.

use async_trait::async_trait;
use indexmap::IndexSet;

use crate::error::StoreError;
use crate::event::{DecodedEvent, ShardRow};
use crate::schema::EventSchema;
use crate::types::ShardKey;

/// Opens writers for individual shards.
#[async_trait]
pub trait ShardStore: Send + Sync {
    /// Open the shard `key`, loading any rows already persisted for it.
    async fn open(
        &self,
        key: &ShardKey,
        schema: &EventSchema,
    ) -> Result<Box<dyn ShardWriter>, StoreError>;
}

/// Exclusive handle on one shard.
#[async_trait]
pub trait ShardWriter: Send {
    fn key(&self) -> &ShardKey;

    /// Highest persisted block number, `None` if the shard has no rows.
    fn committed_through(&self) -> Option<u64>;

    /// Number of persisted rows.
    fn row_count(&self) -> usize;

    /// Merge `events` into the shard and durably replace it.
    ///
    /// Returns the new `committed_through`. An empty batch still writes the
    /// shard so a processed range with no events leaves a file behind.
    async fn append_and_commit(
        &mut self,
        events: &[DecodedEvent],
    ) -> Result<Option<u64>, StoreError>;
}

/// Merge `incoming` into `existing`.
///
/// Exact duplicates are dropped (first occurrence wins) and the result is
/// sorted by block number; the sort is stable so rows within a block keep
/// their arrival order.
pub fn merge_rows(existing: Vec<ShardRow>, incoming: Vec<ShardRow>) -> Vec<ShardRow> {
    let mut set: IndexSet<ShardRow> = existing.into_iter().collect();
    set.extend(incoming);
    let mut rows: Vec<ShardRow> = set.into_iter().collect();
    rows.sort_by_key(|r| r.block_number);
    rows
}

/// Convert `events` to rows and check they belong to `key`.
pub fn rows_for_shard(
    key: &ShardKey,
    schema: &EventSchema,
    events: &[DecodedEvent],
) -> Result<Vec<ShardRow>, StoreError> {
    events
        .iter()
        .map(|event| {
            if event.block_number < key.start || event.block_number >= key.end {
                return Err(StoreError::OutOfRange {
                    block: event.block_number,
                    shard: key.to_string(),
                });
            }
            Ok(ShardRow::from_event(event, schema))
        })
        .collect()
}
