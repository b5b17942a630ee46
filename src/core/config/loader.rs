#![allow(clippy::result_large_err)]

use super::{ConfigValidator, EngineConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/docflow.toml)
    /// Environment variables override config file values
    /// Falls back to defaults when the file doesn't exist
    pub fn load_from_workspace(workspace_path: &Path) -> Result<EngineConfig, AppError> {
        let config_path = workspace_path.join("docflow.toml");
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();

        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<EngineConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(config: &mut EngineConfig) {
        if let Ok(base_url) = env::var("DOCFLOW_GATEWAY_BASE_URL") {
            config.gateway.base_url = base_url;
        }

        if let Ok(timeout) = env::var("DOCFLOW_GATEWAY_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                config.gateway.timeout_seconds = timeout;
            }
        }

        if let Ok(token_env) = env::var("DOCFLOW_GATEWAY_TOKEN_ENV") {
            config.gateway.auth_token_env = Some(token_env);
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "DOCFLOW_GATEWAY_BASE_URL - Override persistence service base URL",
            "DOCFLOW_GATEWAY_TIMEOUT_SECONDS - Override per-request timeout (default: 30)",
            "DOCFLOW_GATEWAY_TOKEN_ENV - Name of the variable holding the bearer token",
        ]
    }
}
