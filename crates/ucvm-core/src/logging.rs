//! Logging init: append to a file under the XDG state dir, or fall back to stderr.
//!
//! The filter comes from `UCVM_LOG`, then `RUST_LOG`, then [`DEFAULT_FILTER`].

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,ucvm=debug,ucvm_core=debug";

/// Filter directives from the first non-empty variable, else the default.
fn filter_directives(ucvm_log: Option<String>, rust_log: Option<String>) -> String {
    [ucvm_log, rust_log]
        .into_iter()
        .flatten()
        .map(|d| d.trim().to_string())
        .find(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn env_filter() -> EnvFilter {
    let directives = filter_directives(std::env::var("UCVM_LOG").ok(), std::env::var("RUST_LOG").ok());
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("ucvm: ignoring bad log filter {directives:?}: {e}");
        EnvFilter::new(DEFAULT_FILTER)
    })
}

/// Path of the log file: `~/.local/state/ucvm/ucvm.log`.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ucvm")?;
    Ok(xdg_dirs.get_state_home().join("ucvm").join("ucvm.log"))
}

/// Initialize structured logging to [`log_file_path`].
/// On failure (e.g. log dir unwritable), returns Err so the caller can fall back to stderr.
pub fn init_logging() -> Result<()> {
    let log_file_path = log_file_path()?;
    if let Some(dir) = log_file_path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)
        .with_context(|| format!("open log file {}", log_file_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("install log subscriber: {e}"))?;

    tracing::info!("ucvm logging initialized at {}", log_file_path.display());
    Ok(())
}

/// Initialize logging to stderr only (no file). Use when init_logging() fails so the CLI doesn't crash.
pub fn init_logging_stderr() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
    if installed.is_err() {
        // A subscriber is already set; keep it.
        tracing::debug!("stderr logging not installed: subscriber already set");
    }
}
