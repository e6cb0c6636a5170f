//! Window and shard planning.
//!
//! Both planners are pure functions of their inputs, so a resumed worker can
//! recompute its schedule from a new start block at any time.

use crate::error::IngestError;
use crate::types::BlockWindow;

/// Lazy sequence of query windows over `[start, end)`.
#[derive(Debug, Clone)]
pub struct WindowPlan {
    next: u64,
    end: u64,
    size: u64,
}

impl Iterator for WindowPlan {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<BlockWindow> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.size).min(self.end);
        self.next = end;
        Some(BlockWindow::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        let n = remaining.div_ceil(self.size) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for WindowPlan {}

/// Split `[start, end)` into windows of at most `window_size` blocks.
///
/// Returns an empty plan when `start >= end`.
pub fn plan_windows(start: u64, end: u64, window_size: u64) -> Result<WindowPlan, IngestError> {
    if window_size == 0 {
        return Err(IngestError::InvalidPlan("window size must be > 0".into()));
    }
    Ok(WindowPlan {
        next: start,
        end,
        size: window_size,
    })
}

/// Lazy sequence of shard-aligned sub-ranges over a job's full range.
#[derive(Debug, Clone)]
pub struct ShardPlan {
    next: u64,
    end: u64,
    size: u64,
}

impl Iterator for ShardPlan {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<BlockWindow> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let boundary = (start - start % self.size).saturating_add(self.size);
        let end = boundary.min(self.end);
        self.next = end;
        Some(BlockWindow::new(start, end))
    }
}

/// Split `full_range` at multiples of `shard_size`.
///
/// The first sub-range stops at the next shard boundary when the range start
/// is unaligned; the last one is clipped to the range end.
pub fn plan_shards(full_range: BlockWindow, shard_size: u64) -> Result<ShardPlan, IngestError> {
    if shard_size == 0 {
        return Err(IngestError::InvalidPlan("shard size must be > 0".into()));
    }
    Ok(ShardPlan {
        next: full_range.start,
        end: full_range.end,
        size: shard_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(windows: &[BlockWindow], start: u64, end: u64, max_len: u64) {
        assert_eq!(windows.first().unwrap().start, start);
        assert_eq!(windows.last().unwrap().end, end);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap in {pair:?}");
        }
        for w in windows {
            assert!(w.start < w.end);
            assert!(w.len() <= max_len, "{w} longer than {max_len}");
        }
    }

    #[test]
    fn windows_cover_range_exactly() {
        let cases = [
            (0, 1, 1),
            (0, 100, 10),
            (0, 101, 10),
            (1000, 1050, 20),
            (7, 8, 1_000),
            (17_000_000, 17_000_100, 2_000),
            (3, 1_000_003, 333),
        ];
        for (start, end, size) in cases {
            let windows: Vec<_> = plan_windows(start, end, size).unwrap().collect();
            assert_covers(&windows, start, end, size);
            let expected = (end - start).div_ceil(size) as usize;
            assert_eq!(windows.len(), expected, "case {start}..{end} / {size}");
        }
    }

    #[test]
    fn last_window_is_clipped() {
        let windows: Vec<_> = plan_windows(1000, 1050, 20).unwrap().collect();
        assert_eq!(
            windows,
            vec![
                BlockWindow::new(1000, 1020),
                BlockWindow::new(1020, 1040),
                BlockWindow::new(1040, 1050),
            ]
        );
    }

    #[test]
    fn empty_when_start_not_below_end() {
        assert_eq!(plan_windows(10, 10, 5).unwrap().count(), 0);
        assert_eq!(plan_windows(11, 10, 5).unwrap().count(), 0);
    }

    #[test]
    fn zero_window_size_rejected() {
        assert!(plan_windows(0, 10, 0).is_err());
        assert!(plan_shards(BlockWindow::new(0, 10), 0).is_err());
    }

    #[test]
    fn plan_is_restartable() {
        let plan = plan_windows(0, 95, 10).unwrap();
        let first: Vec<_> = plan.clone().collect();
        let second: Vec<_> = plan.collect();
        assert_eq!(first, second);
        assert_eq!(plan_windows(0, 95, 10).unwrap().len(), 10);
    }

    #[test]
    fn shards_aligned_ranges() {
        let subs: Vec<_> = plan_shards(BlockWindow::new(0, 300), 100).unwrap().collect();
        assert_eq!(
            subs,
            vec![
                BlockWindow::new(0, 100),
                BlockWindow::new(100, 200),
                BlockWindow::new(200, 300),
            ]
        );
    }

    #[test]
    fn shards_unaligned_start_and_clipped_end() {
        let subs: Vec<_> = plan_shards(BlockWindow::new(1_250, 3_100), 1_000)
            .unwrap()
            .collect();
        assert_eq!(
            subs,
            vec![
                BlockWindow::new(1_250, 2_000),
                BlockWindow::new(2_000, 3_000),
                BlockWindow::new(3_000, 3_100),
            ]
        );
        assert_covers(&subs, 1_250, 3_100, 1_000);
    }

    #[test]
    fn shard_inside_single_boundary() {
        let subs: Vec<_> = plan_shards(BlockWindow::new(1_010, 1_040), 50).unwrap().collect();
        assert_eq!(subs, vec![BlockWindow::new(1_010, 1_040)]);
    }
}
