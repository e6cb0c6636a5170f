//! Shard worker — ingests one shard-aligned sub-range.
//!
//! ```text
//! open shard → start block → for each window: fetch → decode → buffer
//!                                      every N windows: append_and_commit
//! ```
//!
//! The buffer is owned by the worker and only ever holds complete windows, so
//! a commit never records a checkpoint past a block whose logs are missing.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use chainshard_core::error::WorkerError;
use chainshard_core::event::DecodedEvent;
use chainshard_core::planner::plan_windows;
use chainshard_core::schema::EventSchema;
use chainshard_core::store::{ShardStore, ShardWriter};
use chainshard_core::types::{BlockWindow, ShardKey};

use crate::decoder::EventDecoder;
use crate::fetcher::RetryingFetcher;
use crate::source::LogFilter;

/// Settings shared by every worker of a job.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub window_size: u64,
    /// Commit after this many windows.
    pub flush_every_windows: u32,
    /// Start from the shard checkpoint instead of the sub-range start.
    pub resume: bool,
}

/// What a worker did, successful or cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub shard: ShardKey,
    pub range: BlockWindow,
    /// First block actually queried.
    pub start_block: u64,
    pub windows: u64,
    pub logs_fetched: u64,
    pub events: u64,
    pub decode_failures: u64,
    pub committed_through: Option<u64>,
    /// Stopped early by the cancellation token.
    pub cancelled: bool,
}

/// One unit of work: a sub-range and the shard it writes to.
pub struct ShardWorker {
    pub(crate) shard: ShardKey,
    pub(crate) range: BlockWindow,
    pub(crate) schema: Arc<EventSchema>,
    pub(crate) decoder: Arc<EventDecoder>,
    pub(crate) fetcher: RetryingFetcher,
    pub(crate) store: Arc<dyn ShardStore>,
    pub(crate) filter: Arc<LogFilter>,
    pub(crate) settings: WorkerSettings,
    pub(crate) cancel: CancellationToken,
}

impl ShardWorker {
    /// First block to query given the shard's checkpoint.
    pub fn start_block(range: BlockWindow, committed_through: Option<u64>, resume: bool) -> u64 {
        match (resume, committed_through) {
            (true, Some(c)) => c.saturating_add(1).clamp(range.start, range.end),
            _ => range.start,
        }
    }

    pub async fn run(self) -> Result<WorkerReport, WorkerError> {
        let mut writer = self.store.open(&self.shard, &self.schema).await?;
        let start = Self::start_block(self.range, writer.committed_through(), self.settings.resume);

        let mut report = WorkerReport {
            shard: self.shard.clone(),
            range: self.range,
            start_block: start,
            windows: 0,
            logs_fetched: 0,
            events: 0,
            decode_failures: 0,
            committed_through: writer.committed_through(),
            cancelled: false,
        };

        if start > self.range.start {
            tracing::info!(
                start,
                committed_through = ?writer.committed_through(),
                "resuming from checkpoint"
            );
        }

        let windows = plan_windows(start, self.range.end, self.settings.window_size)?;

        let mut buffer: Vec<DecodedEvent> = Vec::new();
        let mut pending_windows = 0u32;
        // a shard with rows already has a file on disk
        let mut persisted = writer.row_count() > 0;

        for window in windows {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                res = self.fetcher.fetch(window, &self.filter) => Some(res),
            };
            let logs = match fetched {
                None => {
                    report.cancelled = true;
                    break;
                }
                Some(Ok(logs)) => logs,
                Some(Err(e)) => {
                    // keep what earlier windows produced before giving up
                    if !buffer.is_empty() {
                        match commit(writer.as_mut(), &mut buffer).await {
                            Ok(through) => report.committed_through = through,
                            Err(store_err) => {
                                tracing::error!(error = %store_err, "flush before abort failed");
                            }
                        }
                    }
                    return Err(WorkerError::Fetch { window, source: e });
                }
            };

            report.windows += 1;
            report.logs_fetched += logs.len() as u64;
            let before = buffer.len();
            for log in &logs {
                match self.decoder.decode(log) {
                    Ok(event) => buffer.push(event),
                    Err(e) => {
                        report.decode_failures += 1;
                        tracing::warn!(
                            error = %e,
                            tx = ?log.tx_hash,
                            block = ?log.block_number,
                            "dropping undecodable log"
                        );
                    }
                }
            }
            report.events += (buffer.len() - before) as u64;
            tracing::debug!(window = %window, logs = logs.len(), "window fetched");

            pending_windows += 1;
            if pending_windows >= self.settings.flush_every_windows {
                report.committed_through = commit(writer.as_mut(), &mut buffer).await?;
                pending_windows = 0;
                persisted = true;
            }
        }

        if !buffer.is_empty() || (!persisted && !report.cancelled) {
            report.committed_through = commit(writer.as_mut(), &mut buffer).await?;
        }

        if report.cancelled {
            tracing::info!(
                committed_through = ?report.committed_through,
                events = report.events,
                "worker cancelled"
            );
        } else {
            tracing::info!(
                windows = report.windows,
                events = report.events,
                decode_failures = report.decode_failures,
                rows = writer.row_count(),
                "shard complete"
            );
        }
        Ok(report)
    }
}

async fn commit(
    writer: &mut dyn ShardWriter,
    buffer: &mut Vec<DecodedEvent>,
) -> Result<Option<u64>, WorkerError> {
    let events = std::mem::take(buffer);
    let through = writer.append_and_commit(&events).await?;
    tracing::info!(
        shard = %writer.key(),
        events = events.len(),
        committed_through = ?through,
        "committed"
    );
    Ok(through)
}
