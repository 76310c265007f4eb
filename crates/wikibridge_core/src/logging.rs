//! Structured logging via `tracing`.
//!
//! Logs always go to stderr so stdout stays reserved for JSON results. When a log file is
//! configured the same events are appended there as well, without ANSI colors.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::BridgeConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// `verbose` forces `debug` regardless of env and config.
    pub fn resolve(config: &BridgeConfig, project_root: &Path, verbose: bool) -> Self {
        let filter = if verbose {
            "debug".to_string()
        } else {
            config.log_filter()
        };
        let file = config.log_file().map(|path| {
            if path.is_absolute() {
                path
            } else {
                project_root.join(path)
            }
        });
        Self { filter, file }
    }
}

pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::try_new(&settings.filter)
        .with_context(|| format!("invalid log filter {:?}", settings.filter))?;
    let base = Registry::default().with(filter);

    match settings.file.as_deref() {
        Some(path) => {
            let file = open_log_file(path)?;
            base.with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(std::io::stderr.and(file)),
            )
            .try_init()
            .context("failed to install tracing subscriber")?;
        }
        None => {
            base.with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("failed to install tracing subscriber")?;
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
