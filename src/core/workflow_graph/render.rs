//! Presentation attributes derived from execution state.
//!
//! [`project`] is a pure function of the graph and palette: no caching, no hidden state.

use crate::core::workflow_graph::graph::{ApprovalValue, Edge, Graph, Node, NodeKind};
use serde::{Deserialize, Serialize};

/// Colors used by the projection. Every field can be overridden from `[render]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub start: String,
    pub end: String,
    pub action: String,
    pub document: String,
    pub integration: String,
    pub switch: String,
    pub approval_neutral: String,
    pub approved: String,
    pub rejected: String,
    pub halted: String,
    pub executed: String,
    pub pending: String,
    pub inactive: String,
    pub neutral: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            start: "#d1fae5".to_string(),
            end: "#fee2e2".to_string(),
            action: "#dbeafe".to_string(),
            document: "#ede9fe".to_string(),
            integration: "#ffedd5".to_string(),
            switch: "#fef9c3".to_string(),
            approval_neutral: "#f3f4f6".to_string(),
            approved: "#22c55e".to_string(),
            rejected: "#ef4444".to_string(),
            halted: "#b91c1c".to_string(),
            executed: "#16a34a".to_string(),
            pending: "#f59e0b".to_string(),
            inactive: "#d1d5db".to_string(),
            neutral: "#9ca3af".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Idle,
    Pending,
    Executed,
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: String,
    pub kind: String,
    pub fill: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub color: String,
    pub animated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderGraph {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
}

impl RenderGraph {
    pub fn node(&self, id: &str) -> Option<&RenderNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&RenderEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }
}

pub fn project(graph: &Graph, palette: &Palette) -> RenderGraph {
    RenderGraph {
        nodes: graph
            .nodes()
            .iter()
            .map(|node| render_node(node, palette))
            .collect(),
        edges: graph
            .edges()
            .iter()
            .map(|edge| render_edge(graph, edge, palette))
            .collect(),
    }
}

fn node_status(node: &Node) -> NodeStatus {
    if node.kind.halted().is_some() {
        NodeStatus::Halted
    } else if node.is_executed() {
        NodeStatus::Executed
    } else if node.is_pending() {
        NodeStatus::Pending
    } else {
        NodeStatus::Idle
    }
}

fn render_node(node: &Node, palette: &Palette) -> RenderNode {
    let status = node_status(node);
    let fill = if status == NodeStatus::Halted {
        &palette.halted
    } else {
        match &node.kind {
            NodeKind::Start(_) => &palette.start,
            NodeKind::End(_) => &palette.end,
            NodeKind::Action(data) if data.is_approval() => match data.is_approved {
                ApprovalValue::Undefined => &palette.approval_neutral,
                ApprovalValue::True => &palette.approved,
                ApprovalValue::False => &palette.rejected,
            },
            NodeKind::Action(_) => &palette.action,
            NodeKind::DocumentRef(_) => &palette.document,
            NodeKind::Integration(_) => &palette.integration,
            NodeKind::Switch(_) => &palette.switch,
        }
    };
    RenderNode {
        id: node.id.clone(),
        kind: node.kind.name().to_string(),
        fill: fill.clone(),
        status,
        message: node.kind.halted().map(|halt| halt.to_string()),
    }
}

fn render_edge(graph: &Graph, edge: &Edge, palette: &Palette) -> RenderEdge {
    let (color, animated) = match graph.get_node(&edge.source) {
        Ok(source) => {
            let is_switch = matches!(source.kind, NodeKind::Switch(_));
            if is_switch && source.is_executed() && !edge.is_active() {
                (&palette.inactive, false)
            } else if source.is_executed() {
                (&palette.executed, true)
            } else if source.is_pending() {
                (&palette.pending, true)
            } else if is_switch && !edge.is_active() {
                (&palette.inactive, false)
            } else {
                (&palette.neutral, false)
            }
        }
        Err(_) => (&palette.neutral, false),
    };
    RenderEdge {
        id: edge.id.clone(),
        source: edge.source.clone(),
        target: edge.target.clone(),
        color: color.clone(),
        animated,
    }
}
