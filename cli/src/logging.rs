//! Tracing / logging initialisation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: component_name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
    /// Also write a `job_<timestamp>.log` file here.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
            log_dir: None,
        }
    }
}

impl LogConfig {
    /// Directive string such as `"info,chainshard_evm=debug"`.
    pub fn directives(&self) -> String {
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        let mut directives = self.level.clone();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Parse a `component=level` flag value.
pub fn parse_component(s: &str) -> Result<(String, String), String> {
    let (name, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected component=level, got '{s}'"))?;
    if name.is_empty() || level.is_empty() {
        return Err(format!("expected component=level, got '{s}'"));
    }
    Ok((name.to_string(), level.to_string()))
}

/// Initialise tracing. Console output goes to stderr so stdout carries only
/// command output.
///
/// The returned guard flushes the job log file on drop and must be kept
/// alive until exit.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(job_log_appender(dir)?);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    if config.json {
        let file_layer = file_writer.map(|w| fmt::layer().json().with_writer(w).with_ansi(false));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init()?;
    } else {
        let file_layer = file_writer.map(|w| fmt::layer().with_writer(w).with_ansi(false));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init()?;
    }

    Ok(guard)
}

fn job_log_appender(dir: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let file_name = format!("job_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    Ok(tracing_appender::rolling::never(dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_components_in_order() {
        let mut cfg = LogConfig {
            level: "warn".into(),
            ..LogConfig::default()
        };
        cfg.components.insert("chainshard-evm".into(), "debug".into());
        cfg.components.insert("chainshard-core".into(), "trace".into());
        assert_eq!(
            cfg.directives(),
            "warn,chainshard_core=trace,chainshard_evm=debug"
        );
    }

    #[test]
    fn component_flag_parsing() {
        assert_eq!(
            parse_component("chainshard_evm=debug"),
            Ok(("chainshard_evm".into(), "debug".into()))
        );
        assert!(parse_component("debug").is_err());
        assert!(parse_component("=debug").is_err());
    }

    #[test]
    fn job_log_lands_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        job_log_appender(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
