//! File logging for the TUI. The terminal belongs to ratatui, so log
//! output always goes to a file.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Overrides the computed filter with a full `EnvFilter` directive string
pub const LOG_FILTER_ENV: &str = "FUNNAIR_LOG";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(s, true).ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// HTTP stack targets kept at info unless the user writes their own filter
const DEPENDENCY_TARGETS: &[&str] = &["hyper", "reqwest", "h2", "mio", "rustls"];

fn default_filter(level: LogLevel) -> String {
    match level {
        LogLevel::Debug | LogLevel::Trace => {
            let mut filter = format!(
                "info,funnair={lvl},funnair_core={lvl},funnair_tui={lvl}",
                lvl = level.as_str()
            );
            for target in DEPENDENCY_TARGETS {
                filter.push_str(&format!(",{}=info", target));
            }
            filter
        }
        _ => level.as_str().to_string(),
    }
}

fn build_env_filter(level: LogLevel, env_override: Option<&str>) -> EnvFilter {
    match env_override {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(default_filter(level)),
    }
}

pub fn default_log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().context("Could not find local data directory")?;
    Ok(data_dir.join("funnair").join("funnair.log"))
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// or buffered lines are lost.
pub fn init(level: LogLevel, file: &Path) -> Result<WorkerGuard> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create log directory {}", parent.display()))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .with_context(|| format!("Could not open log file {}", file.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(log_file);
    let env_filter = build_env_filter(level, std::env::var(LOG_FILTER_ENV).ok().as_deref());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(level >= LogLevel::Debug)
        .with_ansi(false)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Logging was already initialized")?;
    Ok(guard)
}
