//! `chainshard ingest` — run an ingestion job against an RPC endpoint.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use chainshard_core::IngestError;
use chainshard_evm::{
    resume_hint, HttpLogSource, HttpSourceConfig, JobBuilder, JobState, JobSummary, LogSource,
    RateLimiterConfig,
};
use chainshard_storage::ParquetShardStore;

use crate::settings::{schema_for, JobArgs};

pub async fn run(args: &JobArgs) -> Result<ExitCode> {
    let mut cfg = args.resolve()?;
    let schema = schema_for(&cfg)?;
    let rpc_url = cfg
        .rpc_url
        .clone()
        .ok_or_else(|| IngestError::Config("--rpc or RPC_ENDPOINT is required".into()))?;

    let source = HttpLogSource::new(
        rpc_url.clone(),
        HttpSourceConfig {
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            rate_limit: cfg.requests_per_second.map(RateLimiterConfig::per_second),
        },
    )
    .context("creating RPC client")?;

    if cfg.to_block.is_none() {
        let head = source
            .head_block()
            .await
            .with_context(|| format!("querying chain head from {rpc_url}"))?;
        tracing::info!(head, "to block defaults to chain head");
        cfg.to_block = Some(head);
    }

    let store = ParquetShardStore::new(&cfg.output_dir)
        .with_context(|| format!("opening output directory {}", cfg.output_dir.display()))?;

    let cancel = CancellationToken::new();
    let coordinator = JobBuilder::from_config(&cfg, schema)
        .source(Arc::new(source))
        .store(Arc::new(store))
        .cancel_token(cancel.clone())
        .build()?;

    tracing::info!(
        rpc = %rpc_url,
        address = ?cfg.address,
        event = %coordinator.prefix(),
        range = %coordinator.plan().full_range,
        output = %cfg.output_dir.display(),
        "starting ingestion"
    );

    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; committing buffered windows and stopping");
                cancel.cancel();
            }
        }
    });

    let summary = coordinator.run().await?;
    ctrl_c.abort();

    print_summary(&summary);
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_summary(summary: &JobSummary) {
    println!(
        "Job {} in {:.1}s: {} shard(s), {} event(s), {} undecodable log(s)",
        summary.state,
        summary.elapsed.as_secs_f64(),
        summary.workers.len() + summary.failed.len(),
        summary.total_events(),
        summary.total_decode_failures(),
    );
    for w in &summary.workers {
        let through = w
            .committed_through
            .map_or_else(|| "-".to_string(), |b| b.to_string());
        let note = if w.cancelled { " (cancelled)" } else { "" };
        println!(
            "  ✓ {:<32} {} windows={} events={} committed_through={}{}",
            w.shard.file_name("parquet"),
            w.range,
            w.windows,
            w.events,
            through,
            note
        );
    }
    for f in &summary.failed {
        println!("  ✗ {:<32} {} [{}] {}", f.shard.file_name("parquet"), f.range, f.kind, f.message);
    }

    if summary.state != JobState::Done {
        let incomplete = summary.incomplete_ranges();
        if !incomplete.is_empty() {
            println!("Re-run incomplete ranges with:");
            for range in incomplete {
                println!("  chainshard ingest ... {}", resume_hint(range));
            }
        }
    }
}
