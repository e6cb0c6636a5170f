//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

// ─── BlockWindow ─────────────────────────────────────────────────────────────

/// A half-open block range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockWindow {
    /// First block in the window (inclusive).
    pub start: u64,
    /// One past the last block in the window (exclusive).
    pub end: u64,
}

impl BlockWindow {
    /// Create a window. `start` must be strictly below `end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start < end, "empty window [{start}, {end})");
        Self { start, end }
    }

    /// Create a window, returning `None` when `start >= end`.
    pub fn try_new(start: u64, end: u64) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Number of blocks covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns `true` if `block` falls inside the window.
    pub fn contains(&self, block: u64) -> bool {
        self.start <= block && block < self.end
    }

    /// Inclusive `(fromBlock, toBlock)` bounds for an `eth_getLogs` call.
    pub fn inclusive_bounds(&self) -> (u64, u64) {
        (self.start, self.end - 1)
    }
}

impl std::fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ─── ShardKey ────────────────────────────────────────────────────────────────

/// Identity of a persisted shard: `(prefix, shard_start, shard_end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardKey {
    pub prefix: String,
    pub start: u64,
    pub end: u64,
}

impl ShardKey {
    pub fn new(prefix: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            prefix: prefix.into(),
            start,
            end,
        }
    }

    /// The aligned shard of width `shard_size` that contains `block`.
    pub fn containing(prefix: impl Into<String>, block: u64, shard_size: u64) -> Self {
        let start = block - block % shard_size;
        Self::new(prefix, start, start.saturating_add(shard_size))
    }

    /// The block range owned by this shard.
    pub fn range(&self) -> BlockWindow {
        BlockWindow::new(self.start, self.end)
    }

    /// File name used by on-disk stores.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}-{}-{}.{extension}", self.prefix, self.start, self.end)
    }
}

impl std::fmt::Display for ShardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}, {})", self.prefix, self.start, self.end)
    }
}

// ─── JobPlan ─────────────────────────────────────────────────────────────────

/// Immutable parameters of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPlan {
    /// Full requested range.
    pub full_range: BlockWindow,
    /// Width of every persisted shard.
    pub shard_size: u64,
    /// Maximum blocks per `eth_getLogs` call.
    pub window_size: u64,
    /// Maximum number of concurrently running workers.
    pub concurrency: u32,
    /// Continue from each shard's checkpoint instead of its start.
    pub resume: bool,
}

impl JobPlan {
    /// Check the plan's invariants.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.full_range.is_empty() {
            return Err(IngestError::InvalidPlan(format!(
                "empty range {}",
                self.full_range
            )));
        }
        if self.shard_size == 0 {
            return Err(IngestError::InvalidPlan("shard size must be > 0".into()));
        }
        if self.window_size == 0 {
            return Err(IngestError::InvalidPlan("window size must be > 0".into()));
        }
        if self.concurrency == 0 {
            return Err(IngestError::InvalidPlan("concurrency must be > 0".into()));
        }
        if self.window_size > self.shard_size {
            tracing::warn!(
                window_size = self.window_size,
                shard_size = self.shard_size,
                "window size exceeds shard size; windows will be clipped to shard boundaries"
            );
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_inclusive_bounds() {
        let w = BlockWindow::new(1000, 1020);
        assert_eq!(w.len(), 20);
        assert_eq!(w.inclusive_bounds(), (1000, 1019));
        assert!(w.contains(1000));
        assert!(w.contains(1019));
        assert!(!w.contains(1020));
    }

    #[test]
    fn try_new_rejects_empty() {
        assert!(BlockWindow::try_new(5, 5).is_none());
        assert!(BlockWindow::try_new(6, 5).is_none());
        assert_eq!(BlockWindow::try_new(5, 6), Some(BlockWindow::new(5, 6)));
    }

    #[test]
    fn shard_key_alignment_and_name() {
        let key = ShardKey::containing("transfer", 1032, 50);
        assert_eq!(key, ShardKey::new("transfer", 1000, 1050));
        assert_eq!(key.file_name("parquet"), "transfer-1000-1050.parquet");
        assert_eq!(key.to_string(), "transfer[1000, 1050)");
    }

    #[test]
    fn plan_validation() {
        let mut plan = JobPlan {
            full_range: BlockWindow::new(0, 300),
            shard_size: 100,
            window_size: 20,
            concurrency: 2,
            resume: false,
        };
        assert!(plan.validate().is_ok());

        plan.window_size = 0;
        assert!(plan.validate().is_err());
        plan.window_size = 20;
        plan.concurrency = 0;
        assert!(plan.validate().is_err());
    }
}
