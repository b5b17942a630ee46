#![allow(clippy::result_large_err)]

use super::EngineConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &EngineConfig) -> Result<(), AppError> {
        let parsed = Url::parse(&config.gateway.base_url).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!(
                    "gateway.base_url '{}' is not a valid URL: {}",
                    config.gateway.base_url, err
                ),
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                "gateway.base_url must use http or https",
            ));
        }

        if config.gateway.timeout_seconds == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                "gateway.timeout_seconds must be >= 1",
            ));
        }

        if let Some(token_env) = &config.gateway.auth_token_env {
            if token_env.trim().is_empty() {
                return Err(AppError::new(
                    ErrorCategory::ConfigError,
                    "gateway.auth_token_env cannot be empty when set",
                ));
            }
        }

        if config.session.event_buffer == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                "session.event_buffer must be >= 1",
            ));
        }

        Ok(())
    }
}
