use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

pub const LOG_ENV: &str = "WALL_LOG";

/// Sends tracing output to a file; the terminal belongs to the UI.
/// `WALL_LOG` takes precedence over the configured level.
pub fn init(cfg: &LoggingConfig) -> Result<PathBuf> {
    let path = match cfg.file.clone().or_else(default_log_path) {
        Some(path) => path,
        None => return Err(anyhow!("logging: no log file location available")),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("logging: create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("logging: open {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("logging: {err}"))?;

    Ok(path)
}

fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("wall-tui").join("wall-tui.log"))
}
