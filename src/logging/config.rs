use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;
use url::Url;

const DEFAULT_LEVEL: &str = "info";
const DEFAULT_SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Line format of the file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Resolved logging configuration: defaults, then `.docflow/config/logging.toml`, then env.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub format: LogFormat,
    pub console_output: Option<ConsoleOutput>,
    pub opentelemetry: OpenTelemetryConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenTelemetryConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: DEFAULT_LEVEL.to_string(),
            enable_file: true,
            format: LogFormat::default(),
            console_output: None,
            opentelemetry: OpenTelemetryConfig::default(),
        }
    }
}

impl Default for OpenTelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn load(workspace_root: Option<&Path>) -> Result<Self> {
        let mut config = LoggingConfig::default();
        if let Some(workspace) = workspace_root {
            let path = workspace
                .join(".docflow")
                .join("config")
                .join("logging.toml");
            if let Some(section) = read_section(&path)? {
                config.merge(section);
            }
        }
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn merge(&mut self, section: LoggingSection) {
        if let Some(log_dir) = section.log_dir {
            self.log_dir = Some(log_dir);
        }
        if let Some(level) = section.default_level {
            self.default_level = level;
        }
        if let Some(enable_file) = section.enable_file {
            self.enable_file = enable_file;
        }
        if let Some(format) = section.format {
            self.format = format;
        }
        if section.console_output.is_some() {
            self.console_output = section.console_output;
        }
        if let Some(otel) = section.opentelemetry {
            if let Some(enabled) = otel.enabled {
                self.opentelemetry.enabled = enabled;
            }
            if otel.endpoint.is_some() {
                self.opentelemetry.endpoint = otel.endpoint;
            }
            if let Some(service_name) = otel.service_name {
                self.opentelemetry.service_name = service_name;
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.opentelemetry.endpoint = Some(endpoint);
                self.opentelemetry.enabled = true;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level)
            .map_err(|_| anyhow!("logging.default_level must be a valid tracing directive"))?;

        match (&self.opentelemetry.endpoint, self.opentelemetry.enabled) {
            (Some(endpoint), _) => {
                Url::parse(endpoint)
                    .map_err(|err| anyhow!("invalid logging.opentelemetry.endpoint: {}", err))?;
            }
            (None, true) => {
                return Err(anyhow!(
                    "logging.opentelemetry.endpoint is required when opentelemetry is enabled"
                ))
            }
            (None, false) => {}
        }

        if self.opentelemetry.enabled && self.opentelemetry.service_name.trim().is_empty() {
            return Err(anyhow!(
                "logging.opentelemetry.service_name must be set when opentelemetry is enabled"
            ));
        }
        Ok(())
    }
}

fn read_section(path: &Path) -> Result<Option<LoggingSection>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read logging config {}", path.display()))?;
    let file: LoggingFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse logging config {}", path.display()))?;
    Ok(file.logging)
}

#[derive(Debug, Deserialize)]
struct LoggingFile {
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
struct LoggingSection {
    log_dir: Option<PathBuf>,
    default_level: Option<String>,
    enable_file: Option<bool>,
    format: Option<LogFormat>,
    console_output: Option<ConsoleOutput>,
    opentelemetry: Option<OpenTelemetrySection>,
}

#[derive(Debug, Deserialize)]
struct OpenTelemetrySection {
    enabled: Option<bool>,
    endpoint: Option<String>,
    service_name: Option<String>,
}
