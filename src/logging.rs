//! Tracing subscriber setup.
//!
//! The explorer owns the terminal, so its logs go to a file. `--dump` has no
//! UI and logs to stderr, keeping stdout clean for the JSON.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{Result, TreeError};

/// Environment variable holding a filter directive; wins over the config level.
pub const LOG_ENV: &str = "WTREE_LOG";

/// Where log lines are written.
#[derive(Debug, Clone, Copy)]
pub enum LogTarget<'a> {
    File(&'a Path),
    Stderr,
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Fails if one is already installed or the
/// log file cannot be opened.
pub fn init(level: &str, target: LogTarget<'_>) -> Result<()> {
    let filter = build_env_filter(level);
    let base = Registry::default().with(filter);

    let installed = match target {
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            base.with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .try_init()
        }
        LogTarget::Stderr => base
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| TreeError::Logging(e.to_string()))
}
