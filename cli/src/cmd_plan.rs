//! `chainshard plan` — print the shard and window plan without touching the
//! network.

use anyhow::Result;
use serde::Serialize;

use chainshard_core::planner::{plan_shards, plan_windows};
use chainshard_core::types::ShardKey;
use chainshard_core::IngestError;

use crate::settings::{schema_for, JobArgs};

#[derive(Debug, Serialize)]
struct PlannedShard {
    file: String,
    from: u64,
    to: u64,
    windows: usize,
}

pub fn run(args: &JobArgs, as_json: bool) -> Result<()> {
    let cfg = args.resolve()?;
    if cfg.to_block.is_none() {
        return Err(IngestError::Config("plan needs --to (the chain head is not queried)".into()).into());
    }
    let plan = cfg.to_plan()?;
    let prefix = match &cfg.prefix {
        Some(p) => p.clone(),
        None => cfg.prefix_for(&schema_for(&cfg)?),
    };

    let mut shards = Vec::new();
    for range in plan_shards(plan.full_range, plan.shard_size)? {
        let key = ShardKey::containing(prefix.clone(), range.start, plan.shard_size);
        shards.push(PlannedShard {
            file: key.file_name("parquet"),
            from: range.start,
            to: range.end,
            windows: plan_windows(range.start, range.end, plan.window_size)?.len(),
        });
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&shards)?);
        return Ok(());
    }

    let total_windows: usize = shards.iter().map(|s| s.windows).sum();
    println!(
        "Range {}: {} shard(s), {} window(s), concurrency {}",
        plan.full_range,
        shards.len(),
        total_windows,
        plan.concurrency
    );
    for s in &shards {
        println!("  {:<32} [{}, {})  windows={}", s.file, s.from, s.to, s.windows);
    }
    Ok(())
}
