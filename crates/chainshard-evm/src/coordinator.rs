//! Worker Coordinator: partitions a job into shard-aligned sub-ranges and runs
//! one worker per sub-range on a bounded pool.
//!
//! ```text
//! Planning ─▶ Dispatching ─▶ Draining ─▶ Done | Failed | Cancelled
//! ```
//!
//! Admission is a semaphore permit acquired *before* spawning, so dispatch
//! blocks while `concurrency` workers are active. Workers share no mutable
//! state; each returns a `WorkerReport` or a `WorkerError` that the
//! coordinator folds into the `JobSummary`.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use chainshard_core::error::{ErrorKind, IngestError, WorkerError};
use chainshard_core::planner::plan_shards;
use chainshard_core::schema::EventSchema;
use chainshard_core::store::ShardStore;
use chainshard_core::types::{BlockWindow, JobPlan, ShardKey};

use crate::decoder::EventDecoder;
use crate::fetcher::RetryingFetcher;
use crate::source::LogFilter;
use crate::worker::{ShardWorker, WorkerReport, WorkerSettings};

/// Lifecycle of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not started, or splitting the range.
    Planning,
    /// Spawning workers as permits free up.
    Dispatching,
    /// Every sub-range dispatched; waiting for workers.
    Draining,
    /// Every sub-range ingested.
    Done,
    /// At least one sub-range failed.
    Failed,
    /// Stopped by the cancellation token before finishing.
    Cancelled,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Draining => write!(f, "draining"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A sub-range that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRange {
    pub range: BlockWindow,
    pub shard: ShardKey,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailedRange {
    /// Flags that re-run exactly this sub-range from its checkpoint.
    pub fn resume_hint(&self) -> String {
        resume_hint(self.range)
    }
}

/// `--from/--to/--resume` flags covering `range`.
pub fn resume_hint(range: BlockWindow) -> String {
    format!("--from {} --to {} --resume", range.start, range.end)
}

/// Outcome of `Coordinator::run`.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub state: JobState,
    pub plan: JobPlan,
    /// Reports of workers that returned, sorted by sub-range.
    pub workers: Vec<WorkerReport>,
    pub failed: Vec<FailedRange>,
    /// Sub-ranges never dispatched because of cancellation.
    pub skipped: Vec<BlockWindow>,
    pub elapsed: Duration,
}

impl JobSummary {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn total_events(&self) -> u64 {
        self.workers.iter().map(|w| w.events).sum()
    }

    pub fn total_decode_failures(&self) -> u64 {
        self.workers.iter().map(|w| w.decode_failures).sum()
    }

    /// Sub-ranges a follow-up `--resume` run has to cover: failed, skipped and
    /// cancelled ones, in block order.
    pub fn incomplete_ranges(&self) -> Vec<BlockWindow> {
        let mut ranges: Vec<BlockWindow> = self
            .failed
            .iter()
            .map(|f| f.range)
            .chain(self.skipped.iter().copied())
            .chain(self.workers.iter().filter(|w| w.cancelled).map(|w| w.range))
            .collect();
        ranges.sort();
        ranges.dedup();
        ranges
    }
}

/// Runs one ingestion job. Built by `JobBuilder`.
pub struct Coordinator {
    pub(crate) plan: JobPlan,
    pub(crate) prefix: String,
    pub(crate) schema: Arc<EventSchema>,
    pub(crate) decoder: Arc<EventDecoder>,
    pub(crate) fetcher: RetryingFetcher,
    pub(crate) store: Arc<dyn ShardStore>,
    pub(crate) filter: Arc<LogFilter>,
    pub(crate) flush_every_windows: u32,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Mutex<JobState>,
}

type TaskOutput = (ShardKey, BlockWindow, Result<WorkerReport, WorkerError>);

impl Coordinator {
    pub fn plan(&self) -> &JobPlan {
        &self.plan
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap()
    }

    /// Token that stops dispatch and makes workers commit and return.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn set_state(&self, next: JobState) {
        let mut state = self.state.lock().unwrap();
        let prev = *state;
        tracing::debug!(from = %prev, to = %next, "job state");
        *state = next;
    }

    /// Run the job to completion.
    ///
    /// Only plan validation errors are returned as `Err`; worker failures are
    /// reported in the summary.
    pub async fn run(&self) -> Result<JobSummary, IngestError> {
        let started = Instant::now();
        self.set_state(JobState::Planning);
        self.plan.validate()?;
        let ranges: Vec<BlockWindow> = plan_shards(self.plan.full_range, self.plan.shard_size)?.collect();

        tracing::info!(
            range = %self.plan.full_range,
            shards = ranges.len(),
            shard_size = self.plan.shard_size,
            window_size = self.plan.window_size,
            concurrency = self.plan.concurrency,
            resume = self.plan.resume,
            "job planned"
        );

        if self.cancel.is_cancelled() {
            tracing::warn!("job cancelled before dispatch");
            self.set_state(JobState::Cancelled);
            return Ok(JobSummary {
                state: JobState::Cancelled,
                plan: self.plan.clone(),
                workers: Vec::new(),
                failed: Vec::new(),
                skipped: ranges,
                elapsed: started.elapsed(),
            });
        }

        self.set_state(JobState::Dispatching);
        let semaphore = Arc::new(Semaphore::new(self.plan.concurrency as usize));
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        let mut dispatched: BTreeMap<BlockWindow, ShardKey> = BTreeMap::new();
        let mut skipped = Vec::new();

        for range in ranges {
            if self.cancel.is_cancelled() {
                skipped.push(range);
                continue;
            }
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                skipped.push(range);
                continue;
            };

            let key = ShardKey::containing(self.prefix.clone(), range.start, self.plan.shard_size);
            let worker = self.worker_for(key.clone(), range);
            let span = tracing::info_span!("worker", shard = %key);
            dispatched.insert(range, key.clone());
            tracing::debug!(range = %range, shard = %key, "dispatching worker");

            tasks.spawn(
                async move {
                    let _permit = permit;
                    let result = match AssertUnwindSafe(worker.run()).catch_unwind().await {
                        Ok(result) => result,
                        Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
                    };
                    (key, range, result)
                }
                .instrument(span),
            );
        }

        if !skipped.is_empty() {
            tracing::warn!(skipped = skipped.len(), "dispatch stopped by cancellation");
        }

        self.set_state(JobState::Draining);
        let mut workers = Vec::new();
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (key, range, result) = match joined {
                Ok(output) => output,
                Err(e) => {
                    // the owning range is identified after the drain
                    tracing::error!(error = %e, "worker task failed to join");
                    continue;
                }
            };
            dispatched.remove(&range);
            match result {
                Ok(report) => workers.push(report),
                Err(e) => {
                    tracing::error!(
                        shard = %key,
                        range = %range,
                        kind = %e.kind(),
                        error = %e,
                        hint = %resume_hint(range),
                        "sub-range failed"
                    );
                    failed.push(FailedRange {
                        range,
                        shard: key,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        for (range, shard) in dispatched {
            failed.push(FailedRange {
                range,
                shard,
                kind: ErrorKind::WorkerPanicked,
                message: "worker task aborted".into(),
            });
        }

        workers.sort_by_key(|w| w.range);
        failed.sort_by_key(|f| f.range);

        let cancelled = !skipped.is_empty() || workers.iter().any(|w| w.cancelled);
        let state = if !failed.is_empty() {
            JobState::Failed
        } else if cancelled {
            JobState::Cancelled
        } else {
            JobState::Done
        };
        self.set_state(state);

        let summary = JobSummary {
            state,
            plan: self.plan.clone(),
            workers,
            failed,
            skipped,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            state = %summary.state,
            events = summary.total_events(),
            decode_failures = summary.total_decode_failures(),
            failed = summary.failed.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "job finished"
        );
        Ok(summary)
    }

    fn worker_for(&self, shard: ShardKey, range: BlockWindow) -> ShardWorker {
        ShardWorker {
            shard,
            range,
            schema: Arc::clone(&self.schema),
            decoder: Arc::clone(&self.decoder),
            fetcher: self.fetcher.clone(),
            store: Arc::clone(&self.store),
            filter: Arc::clone(&self.filter),
            settings: WorkerSettings {
                window_size: self.plan.window_size,
                flush_every_windows: self.flush_every_windows,
                resume: self.plan.resume,
            },
            cancel: self.cancel.clone(),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
