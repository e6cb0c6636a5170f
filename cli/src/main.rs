//! ChainShard CLI — chunked, resumable EVM event ingestion into Parquet shards.
//!
//! # Commands
//! ```text
//! chainshard ingest  --rpc <url> --address <addr> --schema <file> [--from N] [--to N] [--resume]
//! chainshard plan    --schema <file> --from N --to N [--shard-size N] [--window-size N]
//! chainshard inspect --file <shard.parquet>
//! ```
//!
//! Exit codes: 0 on success, 1 when a sub-range failed or the job was
//! interrupted, 2 on configuration errors.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use chainshard_core::{IngestError, SchemaError};

mod cmd_ingest;
mod cmd_inspect;
mod cmd_plan;
mod logging;
mod settings;

use logging::LogConfig;
use settings::JobArgs;

#[derive(Parser)]
#[command(
    name = "chainshard",
    about = "Chunked, resumable EVM event ingestion into Parquet shards",
    long_about = "
ChainShard: fetch one contract event over a block range with eth_getLogs,
decode it and write one Parquet file per shard-aligned block range.
Interrupted or failed ranges resume from the last committed block.

ENVIRONMENT VARIABLES (a .env file in the working directory is loaded):
  RPC_ENDPOINT               JSON-RPC endpoint (--rpc)
  CHAINSHARD_ADDRESS         contract address (--address)
  CHAINSHARD_SCHEMA          event schema file (--schema)
  CHAINSHARD_OUTPUT_DIR      shard output directory (--output-dir)
  CHAINSHARD_LOG             log level (--log-level)
",
    version
)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LogArgs {
    /// Global log level
    #[arg(long, global = true, env = "CHAINSHARD_LOG", default_value = "info")]
    log_level: String,

    /// Per-component level override, e.g. chainshard_evm=debug (repeatable)
    #[arg(long = "log-component", global = true, value_parser = logging::parse_component)]
    log_components: Vec<(String, String)>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    log_json: bool,

    /// Also write a job_<timestamp>.log file to this directory
    #[arg(long, global = true, env = "CHAINSHARD_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl From<LogArgs> for LogConfig {
    fn from(args: LogArgs) -> Self {
        Self {
            level: args.log_level,
            components: args.log_components.into_iter().collect(),
            json: args.log_json,
            log_dir: args.log_dir,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an event over a block range into Parquet shards
    Ingest {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Print the shard and window plan for a range
    Plan {
        #[command(flatten)]
        job: JobArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show row count and checkpoint of a shard file
    Inspect {
        /// Path to the .parquet shard
        #[arg(long)]
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = match logging::init_tracing(&LogConfig::from(cli.log)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Ingest { job } => cmd_ingest::run(&job).await,
        Commands::Plan { job, json } => cmd_plan::run(&job, json).map(|()| ExitCode::SUCCESS),
        Commands::Inspect { file, json } => cmd_inspect::run(&file, json).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    let is_config = err.downcast_ref::<IngestError>().is_some()
        || err.downcast_ref::<SchemaError>().is_some();
    if is_config {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn config_errors_exit_with_two() {
        let err: anyhow::Error = Err::<(), _>(IngestError::Config("missing".into()))
            .context("resolving job")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 2);

        let err = anyhow::anyhow!("connection refused");
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "chainshard",
            "ingest",
            "--rpc",
            "http://localhost:8545",
            "--schema",
            "transfer.sol",
            "--from",
            "1000",
            "--to",
            "1050",
            "--window-size",
            "20",
            "--shard-size",
            "50",
            "--resume",
            "--log-component",
            "chainshard_evm=debug",
        ])
        .unwrap();
        assert_eq!(cli.log.log_components, vec![("chainshard_evm".to_string(), "debug".to_string())]);
        match cli.command {
            Commands::Ingest { job } => {
                assert_eq!(job.from, Some(1000));
                assert_eq!(job.to, Some(1050));
                assert_eq!(job.window_size, Some(20));
                assert_eq!(job.shard_size, Some(50));
                assert!(job.resume);
            }
            _ => panic!("expected ingest"),
        }
    }
}
