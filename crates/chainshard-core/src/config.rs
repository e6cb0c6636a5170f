//! Job configuration.
//!
//! Loaded from TOML, then overlaid by environment variables and command-line
//! flags in the binary. Every field has a default so a config file only
//! needs to name what it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::schema::EventSchema;
use crate::types::{BlockWindow, JobPlan};

/// Backoff settings for the fetch-with-retry client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per window, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 2_000 }
fn default_max_backoff_ms() -> u64 { 30_000 }
fn default_multiplier() -> f64 { 2.0 }

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// Configuration of one ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// HTTP JSON-RPC endpoint.
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Contract address to filter logs by.
    #[serde(default)]
    pub address: Option<String>,
    /// Path to a `.sol` snippet or ABI `.json` file.
    #[serde(default)]
    pub schema: Option<PathBuf>,
    /// Event name, required for ABI files.
    #[serde(default)]
    pub event: Option<String>,
    /// First block (inclusive).
    #[serde(default)]
    pub from_block: Option<u64>,
    /// Last block (exclusive). `None` means the chain head at start-up.
    #[serde(default)]
    pub to_block: Option<u64>,
    #[serde(default = "default_window_size")]
    pub window_size: u64,
    #[serde(default = "default_shard_size")]
    pub shard_size: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default)]
    pub resume: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Shard file prefix; defaults to the lowercased event name.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Commit the worker buffer every N windows.
    #[serde(default = "default_flush_every_windows")]
    pub flush_every_windows: u32,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional client-side rate limit.
    #[serde(default)]
    pub requests_per_second: Option<f64>,
}

fn default_window_size() -> u64 { 2_000 }
fn default_shard_size() -> u64 { 500_000 }
fn default_concurrency() -> u32 { 4 }
fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_flush_every_windows() -> u32 { 10 }
fn default_request_timeout_secs() -> u64 { 40 }

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            address: None,
            schema: None,
            event: None,
            from_block: None,
            to_block: None,
            window_size: default_window_size(),
            shard_size: default_shard_size(),
            concurrency: default_concurrency(),
            resume: false,
            output_dir: default_output_dir(),
            prefix: None,
            flush_every_windows: default_flush_every_windows(),
            retry: RetrySettings::default(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_second: None,
        }
    }
}

impl JobConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(src: &str) -> Result<Self, IngestError> {
        toml::from_str(src).map_err(|e| IngestError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&src)
    }

    /// Shard prefix for `schema`: the configured prefix or the lowercased
    /// event name.
    pub fn prefix_for(&self, schema: &EventSchema) -> String {
        self.prefix
            .clone()
            .unwrap_or_else(|| schema.name.to_lowercase())
    }

    /// Validate the range and sizes and build the `JobPlan`.
    ///
    /// `to_block` must be resolved before this is called.
    pub fn to_plan(&self) -> Result<JobPlan, IngestError> {
        let from = self
            .from_block
            .ok_or_else(|| IngestError::Config("from_block is required".into()))?;
        let to = self
            .to_block
            .ok_or_else(|| IngestError::Config("to_block is not resolved".into()))?;
        let full_range = BlockWindow::try_new(from, to).ok_or_else(|| {
            IngestError::InvalidPlan(format!("from block {from} must be below to block {to}"))
        })?;
        if self.flush_every_windows == 0 {
            return Err(IngestError::Config("flush_every_windows must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(IngestError::Config("retry.max_attempts must be > 0".into()));
        }
        if matches!(self.requests_per_second, Some(rps) if rps <= 0.0) {
            return Err(IngestError::Config("requests_per_second must be > 0".into()));
        }
        let plan = JobPlan {
            full_range,
            shard_size: self.shard_size,
            window_size: self.window_size,
            concurrency: self.concurrency,
            resume: self.resume,
        };
        plan.validate()?;
        Ok(plan)
    }
}
