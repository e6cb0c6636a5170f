//! Fetch-with-retry client.
//!
//! Wraps a `LogSource` so that one window becomes one `eth_getLogs` call per
//! attempt. Transient errors are retried under the `RetryPolicy`; anything
//! else fails the window immediately.

use std::sync::Arc;

use chainshard_core::error::FetchError;
use chainshard_core::types::BlockWindow;

use crate::policy::RetryPolicy;
use crate::source::{LogFilter, LogQuery, LogSource, RawLog};

/// Retrying wrapper around a `LogSource`.
#[derive(Clone)]
pub struct RetryingFetcher {
    source: Arc<dyn LogSource>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(source: Arc<dyn LogSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch every log in `window` matching `filter`.
    ///
    /// Removed logs and logs reported outside the window are dropped.
    pub async fn fetch(
        &self,
        window: BlockWindow,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, FetchError> {
        let query = LogQuery::for_window(window, filter);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.source.get_logs(&query).await {
                Ok(logs) => return Ok(retain_in_window(logs, window)),
                Err(e) if e.is_retryable() => match self.policy.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            window = %window,
                            "retrying eth_getLogs"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            window = %window,
                            "max attempts exceeded"
                        );
                        return Err(FetchError::Transient {
                            reason: e.to_string(),
                            attempts: attempt,
                            exhausted: true,
                        });
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, window = %window, "non-retryable fetch error");
                    return Err(FetchError::Fatal {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

fn retain_in_window(logs: Vec<RawLog>, window: BlockWindow) -> Vec<RawLog> {
    let total = logs.len();
    let kept: Vec<RawLog> = logs
        .into_iter()
        .filter(|log| {
            if log.is_removed() {
                return false;
            }
            // logs without a parsable block number go on to the decoder,
            // which reports them as malformed
            match log.block_number_u64() {
                Some(block) if !window.contains(block) => {
                    tracing::warn!(block, window = %window, "provider returned log outside window");
                    false
                }
                _ => true,
            }
        })
        .collect();
    if kept.len() < total {
        tracing::debug!(dropped = total - kept.len(), window = %window, "dropped logs");
    }
    kept
}
