use crate::logging::config::{LogFormat, LoggingConfig};
use crate::logging::layers::BoxLayer;
use crate::Result;
use anyhow::{anyhow, Context};
use dirs_next::home_dir;
use std::fs::{create_dir_all, OpenOptions};
use std::path::{Component, Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self as tracing_fmt, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_FILE_NAME: &str = "docflow.log";

/// Path of the log file: `<log_dir>/docflow.log`.
pub fn log_file_path(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    Ok(resolve_log_dir(config, workspace_root)?.join(LOG_FILE_NAME))
}

/// Build the non-blocking file layer. The guard must outlive the subscriber.
pub fn file_layer<S>(
    log_file: &Path,
    format: LogFormat,
) -> Result<(BoxLayer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    let directory = log_file.parent().ok_or_else(|| {
        anyhow!(
            "log file path {} has no parent directory",
            log_file.display()
        )
    })?;
    create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let writer = BoxMakeWriter::new(non_blocking);
    let base = tracing_fmt::layer().with_writer(writer).with_ansi(false);
    let layer: BoxLayer<S> = match format {
        LogFormat::Text => Box::new(base.with_target(true)),
        LogFormat::Json => Box::new(base.json().with_current_span(true)),
    };
    Ok((layer, guard))
}

fn resolve_log_dir(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let anchor = match workspace_root {
        Some(workspace) => canonicalize_or_clone(workspace),
        None => home_dir().ok_or_else(|| anyhow!("$HOME directory unavailable"))?,
    };

    match &config.log_dir {
        Some(custom) if custom.is_absolute() => Ok(custom.clone()),
        // Relative overrides must stay under the workspace (or home) they resolve against.
        Some(custom) if custom.components().any(|c| matches!(c, Component::ParentDir)) => {
            Err(anyhow!(
                "logging.log_dir {} resolves outside {}",
                custom.display(),
                anchor.display()
            ))
        }
        Some(custom) => Ok(anchor.join(custom)),
        None => Ok(anchor.join(".docflow").join("logs")),
    }
}

fn canonicalize_or_clone(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
