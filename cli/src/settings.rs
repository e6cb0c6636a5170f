//! Job flags and their merge onto `JobConfig`.
//!
//! Precedence, lowest first: built-in defaults, the `--config` TOML file,
//! environment variables, command-line flags. clap fills a flag from its
//! environment variable when the flag is absent, so both arrive here as
//! `Some` and override the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use chainshard_core::config::JobConfig;
use chainshard_core::schema::{load_schema, EventSchema};

#[derive(Debug, Clone, Default, Args)]
pub struct JobArgs {
    /// TOML job file; flags and environment override its values
    #[arg(long, env = "CHAINSHARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP JSON-RPC endpoint
    #[arg(short, long, env = "RPC_ENDPOINT")]
    pub rpc: Option<String>,

    /// Contract address to filter logs by
    #[arg(short, long, env = "CHAINSHARD_ADDRESS")]
    pub address: Option<String>,

    /// Event schema: a `.sol` snippet or a contract ABI `.json`
    #[arg(short, long, env = "CHAINSHARD_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Event name (required for ABI files)
    #[arg(short, long, env = "CHAINSHARD_EVENT")]
    pub event: Option<String>,

    /// First block, inclusive (default 0)
    #[arg(short, long)]
    pub from: Option<u64>,

    /// Last block, exclusive (default: chain head)
    #[arg(short, long)]
    pub to: Option<u64>,

    /// Blocks per eth_getLogs call
    #[arg(long, env = "CHAINSHARD_WINDOW_SIZE")]
    pub window_size: Option<u64>,

    /// Blocks per output shard
    #[arg(long, env = "CHAINSHARD_SHARD_SIZE")]
    pub shard_size: Option<u64>,

    /// Maximum concurrent workers
    #[arg(short, long, env = "CHAINSHARD_CONCURRENCY")]
    pub concurrency: Option<u32>,

    /// Continue each shard from its last committed block
    #[arg(long)]
    pub resume: bool,

    /// Directory for shard files
    #[arg(short, long, env = "CHAINSHARD_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Shard file prefix (default: lowercased event name)
    #[arg(short = 'x', long, env = "CHAINSHARD_PREFIX")]
    pub prefix: Option<String>,

    /// Commit every N windows
    #[arg(long, env = "CHAINSHARD_FLUSH_EVERY")]
    pub flush_every: Option<u32>,

    /// Attempts per window, including the first
    #[arg(long, env = "CHAINSHARD_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Client-side request budget
    #[arg(long, env = "CHAINSHARD_RPS")]
    pub requests_per_second: Option<f64>,
}

impl JobArgs {
    /// Load the TOML file (if any) and overlay the flags.
    pub fn resolve(&self) -> Result<JobConfig> {
        let mut cfg = match &self.config {
            Some(path) => JobConfig::load(path)
                .with_context(|| format!("loading job config {}", path.display()))?,
            None => JobConfig::default(),
        };
        self.apply(&mut cfg);
        if cfg.from_block.is_none() {
            cfg.from_block = Some(0);
        }
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut JobConfig) {
        if let Some(v) = &self.rpc {
            cfg.rpc_url = Some(v.clone());
        }
        if let Some(v) = &self.address {
            cfg.address = Some(v.clone());
        }
        if let Some(v) = &self.schema {
            cfg.schema = Some(v.clone());
        }
        if let Some(v) = &self.event {
            cfg.event = Some(v.clone());
        }
        if let Some(v) = self.from {
            cfg.from_block = Some(v);
        }
        if let Some(v) = self.to {
            cfg.to_block = Some(v);
        }
        if let Some(v) = self.window_size {
            cfg.window_size = v;
        }
        if let Some(v) = self.shard_size {
            cfg.shard_size = v;
        }
        if let Some(v) = self.concurrency {
            cfg.concurrency = v;
        }
        if self.resume {
            cfg.resume = true;
        }
        if let Some(v) = &self.output_dir {
            cfg.output_dir = v.clone();
        }
        if let Some(v) = &self.prefix {
            cfg.prefix = Some(v.clone());
        }
        if let Some(v) = self.flush_every {
            cfg.flush_every_windows = v;
        }
        if let Some(v) = self.max_attempts {
            cfg.retry.max_attempts = v;
        }
        if let Some(v) = self.requests_per_second {
            cfg.requests_per_second = Some(v);
        }
    }
}

/// Load the event schema named by `cfg`.
pub fn schema_for(cfg: &JobConfig) -> Result<EventSchema> {
    let path = cfg
        .schema
        .as_deref()
        .ok_or_else(|| chainshard_core::IngestError::Config("--schema is required".into()))?;
    let schema = load_schema(path, cfg.event.as_deref())
        .map_err(chainshard_core::IngestError::from)
        .with_context(|| format!("loading event schema {}", path.display()))?;
    Ok(schema)
}
