//! Wire types shared between the docflow engine and the persistence service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canvas viewport persisted alongside the graph. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Lifecycle status of a flow edition as stored by the persistence service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    InProgress,
    Done,
}

/// Status of the document that owns a flow edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Concluded,
}

/// Body of the document status update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusUpdate {
    pub status: DocumentStatus,
}

/// Response returned by a successful flow transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub target_flow_name: String,
}

/// Integration configuration fetched by id. Everything except the name is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub name: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Response of an integration invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Tri-state outcome reported by every engine action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Error,
    Pending,
}

/// Uniform result channel payload: `{ status, message }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub message: String,
}

impl ActionResult {
    pub fn success<T: Into<String>>(message: T) -> Self {
        Self {
            status: ActionStatus::Success,
            message: message.into(),
        }
    }

    pub fn error<T: Into<String>>(message: T) -> Self {
        Self {
            status: ActionStatus::Error,
            message: message.into(),
        }
    }

    pub fn pending<T: Into<String>>(message: T) -> Self {
        Self {
            status: ActionStatus::Pending,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}
