use crate::core::workflow_graph::render::Palette;
use serde::{Deserialize, Serialize};

/// Engine configuration loaded from `docflow.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Persistence gateway endpoint
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Colors used by the render projection
    #[serde(default)]
    pub render: Palette,

    /// Per-session settings
    #[serde(default)]
    pub session: SessionConfig,
}

/// Persistence gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the persistence service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Environment variable holding the bearer token, if the service needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token_env: Option<String>,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the engine event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_event_buffer() -> usize {
    64
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            auth_token_env: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            event_buffer: default_event_buffer(),
        }
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
