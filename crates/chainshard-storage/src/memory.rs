//! In-memory shard store.
//!
//! Keeps committed rows per shard in RAM and records how often each shard was
//! opened and committed, which is what the coordinator tests assert on.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chainshard_core::error::StoreError;
use chainshard_core::event::{DecodedEvent, ShardRow};
use chainshard_core::schema::EventSchema;
use chainshard_core::store::{merge_rows, rows_for_shard, ShardStore, ShardWriter};
use chainshard_core::types::ShardKey;

#[derive(Default)]
struct Inner {
    shards: Mutex<HashMap<ShardKey, Vec<ShardRow>>>,
    opens: Mutex<HashMap<ShardKey, usize>>,
    commits: Mutex<HashMap<ShardKey, usize>>,
    failing: Mutex<HashSet<ShardKey>>,
}

/// In-memory shard store. Clones share the same data.
///
/// All data is lost when the process exits.
#[derive(Default, Clone)]
pub struct MemoryShardStore {
    inner: Arc<Inner>,
}

impl MemoryShardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a shard, as if an earlier run had committed `rows`.
    pub fn seed(&self, key: ShardKey, rows: Vec<ShardRow>) {
        self.inner
            .shards
            .lock()
            .unwrap()
            .insert(key, merge_rows(Vec::new(), rows));
    }

    /// Make every commit to `key` fail with an I/O error.
    pub fn fail_commits(&self, key: ShardKey) {
        self.inner.failing.lock().unwrap().insert(key);
    }

    /// Committed rows of a shard (empty if never committed).
    pub fn rows(&self, key: &ShardKey) -> Vec<ShardRow> {
        self.inner
            .shards
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys of every committed shard, sorted.
    pub fn keys(&self) -> Vec<ShardKey> {
        let mut keys: Vec<ShardKey> = self.inner.shards.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// How many writers were opened for `key`.
    pub fn open_count(&self, key: &ShardKey) -> usize {
        self.inner.opens.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// How many commits succeeded for `key`.
    pub fn commit_count(&self, key: &ShardKey) -> usize {
        self.inner.commits.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ShardStore for MemoryShardStore {
    async fn open(
        &self,
        key: &ShardKey,
        schema: &EventSchema,
    ) -> Result<Box<dyn ShardWriter>, StoreError> {
        *self
            .inner
            .opens
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert(0) += 1;
        let rows = self.rows(key);
        Ok(Box::new(MemoryShardWriter {
            key: key.clone(),
            schema: schema.clone(),
            rows,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryShardWriter {
    key: ShardKey,
    schema: EventSchema,
    rows: Vec<ShardRow>,
    inner: Arc<Inner>,
}

#[async_trait]
impl ShardWriter for MemoryShardWriter {
    fn key(&self) -> &ShardKey {
        &self.key
    }

    fn committed_through(&self) -> Option<u64> {
        self.rows.iter().map(|r| r.block_number).max()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    async fn append_and_commit(
        &mut self,
        events: &[DecodedEvent],
    ) -> Result<Option<u64>, StoreError> {
        if self.inner.failing.lock().unwrap().contains(&self.key) {
            return Err(StoreError::io(
                self.key.to_string(),
                std::io::Error::new(std::io::ErrorKind::Other, "commit rejected"),
            ));
        }
        let incoming = rows_for_shard(&self.key, &self.schema, events)?;
        self.rows = merge_rows(std::mem::take(&mut self.rows), incoming);
        self.inner
            .shards
            .lock()
            .unwrap()
            .insert(self.key.clone(), self.rows.clone());
        *self
            .inner
            .commits
            .lock()
            .unwrap()
            .entry(self.key.clone())
            .or_insert(0) += 1;
        Ok(self.committed_through())
    }
}
