#![allow(clippy::result_large_err)]

//! Flow templates: the authored graph a fresh document edition starts from.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::graph::{ApprovalValue, Edge, Graph, Node, NodeKind};
use docflow_types::Viewport;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const SUPPORTED_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphTemplate {
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Viewport,
}

impl GraphTemplate {
    /// Load and validate a template. `.json` files are read as JSON, anything else as YAML.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let template = if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
        .map_err(|err| {
            AppError::new(
                err.category,
                format!("failed to parse {}: {}", path.display(), err.message),
            )
            .with_code(err.code)
        })?;
        Ok(template)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, AppError> {
        let template: GraphTemplate = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(ErrorCategory::SerializationError, err.to_string())
                .with_code("WFG-TPL-001")
        })?;
        template.validate()?;
        Ok(template)
    }

    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        let template: GraphTemplate = serde_json::from_str(text).map_err(|err| {
            AppError::new(ErrorCategory::SerializationError, err.to_string())
                .with_code("WFG-TPL-001")
        })?;
        template.validate()?;
        Ok(template)
    }

    /// Check version, name and graph structure. Unreachable nodes are only warned about.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.version != SUPPORTED_VERSION {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "unsupported template version {}, expected {}",
                    self.version, SUPPORTED_VERSION
                ),
            )
            .with_code("WFG-TPL-002"));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "template name cannot be empty",
            )
            .with_code("WFG-TPL-003"));
        }

        let graph = Graph::new(self.nodes.clone(), self.edges.clone(), self.viewport)?;
        let unreachable = graph.unreachable_nodes();
        if !unreachable.is_empty() {
            warn!(
                template = %self.name,
                "nodes unreachable from start: {}",
                unreachable.join(", ")
            );
        }
        Ok(())
    }

    /// Build a fresh edition: only the start node pending, nothing executed, edges inactive.
    pub fn materialize(&self) -> Result<Graph, AppError> {
        let nodes = self.nodes.iter().cloned().map(reset_node).collect();
        let edges = self
            .edges
            .iter()
            .cloned()
            .map(|mut edge| {
                edge.data.is_active = false;
                edge
            })
            .collect();
        Ok(Graph::new(nodes, edges, self.viewport)?)
    }
}

fn reset_node(mut node: Node) -> Node {
    let is_start = matches!(node.kind, NodeKind::Start(_));
    node.kind.set_executed(false);
    node.kind.set_pending(is_start);
    match &mut node.kind {
        NodeKind::Action(data) => {
            data.is_approved = ApprovalValue::Undefined;
            data.form_values.clear();
            data.halted = None;
        }
        NodeKind::Integration(data) => data.execution_time = None,
        NodeKind::Switch(data) => data.halted = None,
        NodeKind::End(data) => data.is_readonly = false,
        NodeKind::Start(_) | NodeKind::DocumentRef(_) => {}
    }
    node
}

pub fn load_template(path: &Path) -> Result<GraphTemplate, AppError> {
    GraphTemplate::load_from_file(path)
}
