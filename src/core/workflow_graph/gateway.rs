//! Persistence collaborator: graph saves, flow transfer, integrations, document status.

use crate::core::config::GatewayConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::graph::GraphSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_types::{
    DocumentStatus, DocumentStatusUpdate, FlowStatus, IntegrationConfig, IntegrationResponse,
    TransferResponse,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// ASCII set for encoding path segments (slashes included).
const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'/').add(b'?').add(b'#');

/// Errors surfaced by the persistence service or the transport in front of it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned status {status}: {body}")]
    Server { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("gateway misconfigured: {0}")]
    Config(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let (category, code) = match &err {
            GatewayError::Network(_) => (ErrorCategory::NetworkError, "WFG-NET-001"),
            GatewayError::Server { .. } => (ErrorCategory::NetworkError, "WFG-NET-002"),
            GatewayError::Decode(_) => (ErrorCategory::SerializationError, "WFG-NET-003"),
            GatewayError::Config(_) => (ErrorCategory::ConfigError, "WFG-NET-004"),
        };
        AppError::new(category, err.to_string()).with_code(code)
    }
}

/// Body of `PUT /flows/{flowId}/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUpdate {
    #[serde(flatten)]
    pub snapshot: GraphSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FlowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GraphUpdate {
    pub fn in_progress(snapshot: GraphSnapshot) -> Self {
        Self {
            snapshot,
            status: None,
            completed_at: None,
        }
    }

    pub fn concluded(snapshot: GraphSnapshot, completed_at: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            status: Some(FlowStatus::Done),
            completed_at: Some(completed_at),
        }
    }
}

/// Body of `POST /flows/transfer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub current_document_id: String,
    pub target_flow_id: String,
    pub flow_tasks: GraphSnapshot,
}

/// Body of `POST /integrations/{id}/execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRequest {
    pub document_id: String,
    pub flow_id: String,
    pub node_id: String,
    pub config: IntegrationConfig,
}

/// Request/response contract of the persistence service.
#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    async fn update_graph(&self, flow_id: &str, update: &GraphUpdate) -> Result<(), GatewayError>;

    async fn transfer_flow(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferResponse, GatewayError>;

    async fn fetch_integration(
        &self,
        integration_id: &str,
    ) -> Result<IntegrationConfig, GatewayError>;

    async fn invoke_integration(
        &self,
        integration_id: &str,
        request: &IntegrationRequest,
    ) -> Result<IntegrationResponse, GatewayError>;

    async fn update_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
    ) -> Result<(), GatewayError>;
}

/// JSON-over-HTTP implementation of [`PersistenceGateway`].
#[derive(Clone)]
pub struct HttpPersistenceGateway {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpPersistenceGateway {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            auth_token: None,
        })
    }

    pub fn with_auth_token<T: Into<String>>(mut self, token: T) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Build a gateway from `[gateway]`, reading the bearer token from the configured variable.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            GatewayError::Config(format!("invalid base url '{}': {}", config.base_url, e))
        })?;
        let gateway = Self::new(base_url, Duration::from_secs(config.timeout_seconds))?;
        match &config.auth_token_env {
            Some(var) => Ok(gateway.with_auth_token(load_auth_token(var)?)),
            None => Ok(gateway),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.as_str().trim_end_matches('/').to_string();
        for segment in segments {
            url.push('/');
            url.push_str(&encode_segment(segment));
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "persistence service rejected request");
            return Err(GatewayError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PersistenceGateway for HttpPersistenceGateway {
    async fn update_graph(&self, flow_id: &str, update: &GraphUpdate) -> Result<(), GatewayError> {
        let url = self.endpoint(&["flows", flow_id, "tasks"]);
        debug!(%url, nodes = update.snapshot.nodes.len(), "saving flow graph");
        self.send(self.http.put(&url).json(update)).await?;
        Ok(())
    }

    async fn transfer_flow(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferResponse, GatewayError> {
        let url = self.endpoint(&["flows", "transfer"]);
        debug!(%url, target = %request.target_flow_id, "transferring flow");
        let response = self.send(self.http.post(&url).json(request)).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn fetch_integration(
        &self,
        integration_id: &str,
    ) -> Result<IntegrationConfig, GatewayError> {
        let url = self.endpoint(&["integrations", integration_id]);
        let response = self.send(self.http.get(&url)).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn invoke_integration(
        &self,
        integration_id: &str,
        request: &IntegrationRequest,
    ) -> Result<IntegrationResponse, GatewayError> {
        let url = self.endpoint(&["integrations", integration_id, "execute"]);
        debug!(%url, node_id = %request.node_id, "invoking integration");
        let response = self.send(self.http.post(&url).json(request)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(IntegrationResponse::default());
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn update_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&["documents", document_id, "status"]);
        self.send(self.http.put(&url).json(&DocumentStatusUpdate { status }))
            .await?;
        Ok(())
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT_ENCODE_SET).to_string()
}

fn load_auth_token(var: &str) -> Result<String, GatewayError> {
    let token = env::var(var).map_err(|_| {
        GatewayError::Config(format!("auth token environment variable {} is not set", var))
    })?;
    if token.trim().is_empty() {
        return Err(GatewayError::Config(format!(
            "auth token environment variable {} is empty",
            var
        )));
    }
    Ok(token)
}
