pub mod config;
pub mod context;
pub mod layers;

pub use config::{LogFormat, LoggingConfig};
pub use context::{detect_context, ExecutionContext};
pub use layers::console::ConsoleOutput;

use crate::logging::layers::opentelemetry::OpenTelemetryGuard;
use crate::logging::layers::{console, file, opentelemetry, BoxLayer};
use crate::Result;
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keeps the logging sinks alive. Dropping it flushes the file writer and OTLP exporter.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    _otel_guard: Option<OpenTelemetryGuard>,
    console_output: ConsoleOutput,
    log_file_path: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn console_output(&self) -> ConsoleOutput {
        self.console_output
    }

    /// Path of the file sink, if it is enabled.
    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file_path.as_deref()
    }
}

/// Install the global tracing subscriber.
///
/// Filters come from `RUST_LOG`, else the configured default level. Errors when called
/// twice in one process.
pub fn init(context: ExecutionContext, workspace_root: Option<&Path>) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let config = LoggingConfig::load(workspace_root)?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let mut layers: Vec<BoxLayer<Registry>> = Vec::new();

    let (file_guard, log_file_path) = if config.enable_file {
        let path = file::log_file_path(&config, workspace_root)?;
        let (layer, guard) = file::file_layer::<Registry>(&path, config.format)?;
        layers.push(layer);
        (Some(guard), Some(path))
    } else {
        (None, None)
    };

    let console_output = console::select_console_output(context, config.console_output);
    if let Some(layer) = console::console_layer::<Registry>(console_output) {
        layers.push(layer);
    }

    let mut otel_error = None;
    let otel_guard = if config.opentelemetry.enabled {
        match opentelemetry::build_opentelemetry_layer::<Registry>(&config.opentelemetry) {
            Ok((layer, guard)) => {
                layers.push(layer);
                Some(guard)
            }
            Err(err) => {
                otel_error = Some(err);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(err) = otel_error {
        tracing::warn!("OpenTelemetry disabled: {:#}", err);
    }
    tracing::debug!(context = %context, console = %console_output, "logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
        _otel_guard: otel_guard,
        console_output,
        log_file_path,
    })
}

#[cfg(test)]
/// Reset the initialization guard so tests can reconfigure logging multiple times.
pub fn reset_for_tests() {
    LOGGER_INITIALIZED.store(false, Ordering::SeqCst);
}
