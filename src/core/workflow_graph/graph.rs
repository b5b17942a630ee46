use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::transition::TransitionConfigError;
use docflow_types::Viewport;
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Structural errors raised by graph construction and lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} not found")]
    NodeNotFound(String),
    #[error("duplicate node id {0}")]
    DuplicateNode(String),
    #[error("duplicate edge id {0}")]
    DuplicateEdge(String),
    #[error("edge {edge_id} references unknown node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },
    #[error("graph must contain exactly one start node, found {0}")]
    StartNodeCount(usize),
    #[error("patch may not change the id or start kind of node {0}")]
    IdentityChanged(String),
}

impl From<GraphError> for AppError {
    fn from(err: GraphError) -> Self {
        let code = match &err {
            GraphError::NodeNotFound(_) => "WFG-GRAPH-404",
            GraphError::DuplicateNode(_) | GraphError::DuplicateEdge(_) => "WFG-GRAPH-001",
            GraphError::DanglingEdge { .. } => "WFG-GRAPH-002",
            GraphError::StartNodeCount(_) => "WFG-GRAPH-003",
            GraphError::IdentityChanged(_) => "WFG-GRAPH-004",
        };
        AppError::new(ErrorCategory::ValidationError, err.to_string()).with_code(code)
    }
}

/// Approval decision recorded on an approval action node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalValue {
    #[default]
    Undefined,
    True,
    False,
}

impl ApprovalValue {
    pub fn from_decision(approved: bool) -> Self {
        if approved {
            ApprovalValue::True
        } else {
            ApprovalValue::False
        }
    }

    /// Branch label an approval edge must carry to be selected by this value.
    pub fn branch_label(&self) -> Option<&'static str> {
        match self {
            ApprovalValue::Undefined => None,
            ApprovalValue::True => Some("true"),
            ApprovalValue::False => Some("false"),
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, ApprovalValue::Undefined)
    }
}

/// Where an end node was reached from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndOrigin {
    #[default]
    #[serde(rename = "direct_finish")]
    DirectFinish,
    /// The end node hands the document over to another flow.
    #[serde(rename = "flow_init")]
    TransferFlow,
}

/// What an end node does once executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndTarget {
    #[default]
    DirectFinish,
    TransferFlow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_pending_connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndData {
    #[serde(default)]
    pub from_type: EndOrigin,
    #[serde(default)]
    pub to_type: EndTarget,
    #[serde(default)]
    pub to_flow_id: Option<String>,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_pending_connected: bool,
    #[serde(default)]
    pub is_readonly: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_approved: ApprovalValue,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_pending_connected: bool,
    /// Serialized form definition, either a JSON string or an inline object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_form: Option<Value>,
    #[serde(default)]
    pub form_values: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted: Option<TransitionConfigError>,
}

impl ActionData {
    /// Approval actions branch on their decision; every other action type is linear.
    pub fn is_approval(&self) -> bool {
        self.action_type.ends_with("Approval")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRefData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_pending_connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationData {
    #[serde(default)]
    pub integration_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_pending_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchData {
    pub switch_field: String,
    #[serde(default)]
    pub input_switch: String,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_pending_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted: Option<TransitionConfigError>,
}

/// Kind-specific payload of a node. Each variant carries only its own attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NodeKind {
    #[serde(rename = "startNode")]
    Start(StartData),
    #[serde(rename = "endNode")]
    End(EndData),
    #[serde(rename = "actionNode")]
    Action(ActionData),
    #[serde(rename = "documentNode")]
    DocumentRef(DocumentRefData),
    #[serde(rename = "integrationNode")]
    Integration(IntegrationData),
    #[serde(rename = "switchNode")]
    Switch(SwitchData),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Start(_) => "start",
            NodeKind::End(_) => "end",
            NodeKind::Action(_) => "action",
            NodeKind::DocumentRef(_) => "document",
            NodeKind::Integration(_) => "integration",
            NodeKind::Switch(_) => "switch",
        }
    }

    pub fn is_executed(&self) -> bool {
        match self {
            NodeKind::Start(data) => data.is_executed,
            NodeKind::End(data) => data.is_executed,
            NodeKind::Action(data) => data.is_executed,
            NodeKind::DocumentRef(data) => data.is_executed,
            NodeKind::Integration(data) => data.is_executed,
            NodeKind::Switch(data) => data.is_executed,
        }
    }

    pub fn is_pending(&self) -> bool {
        match self {
            NodeKind::Start(data) => data.is_pending_connected,
            NodeKind::End(data) => data.is_pending_connected,
            NodeKind::Action(data) => data.is_pending_connected,
            NodeKind::DocumentRef(data) => data.is_pending_connected,
            NodeKind::Integration(data) => data.is_pending_connected,
            NodeKind::Switch(data) => data.is_pending_connected,
        }
    }

    /// Branch configuration error recorded when the node executed, if any.
    pub fn halted(&self) -> Option<&TransitionConfigError> {
        match self {
            NodeKind::Action(data) => data.halted.as_ref(),
            NodeKind::Switch(data) => data.halted.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn set_executed(&mut self, executed: bool) {
        match self {
            NodeKind::Start(data) => data.is_executed = executed,
            NodeKind::End(data) => data.is_executed = executed,
            NodeKind::Action(data) => data.is_executed = executed,
            NodeKind::DocumentRef(data) => data.is_executed = executed,
            NodeKind::Integration(data) => data.is_executed = executed,
            NodeKind::Switch(data) => data.is_executed = executed,
        }
    }

    pub(crate) fn set_pending(&mut self, pending: bool) {
        match self {
            NodeKind::Start(data) => data.is_pending_connected = pending,
            NodeKind::End(data) => data.is_pending_connected = pending,
            NodeKind::Action(data) => data.is_pending_connected = pending,
            NodeKind::DocumentRef(data) => data.is_pending_connected = pending,
            NodeKind::Integration(data) => data.is_pending_connected = pending,
            NodeKind::Switch(data) => data.is_pending_connected = pending,
        }
    }
}

/// Canvas position, carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One step of the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    pub fn new<T: Into<String>>(id: T, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: None,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.kind.is_executed()
    }

    pub fn is_pending(&self) -> bool {
        self.kind.is_pending()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(default)]
    pub is_active: bool,
}

/// Directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub data: EdgeData,
}

impl Edge {
    pub fn new<I, S, T>(id: I, source: S, target: T) -> Self
    where
        I: Into<String>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            label: None,
            data: EdgeData::default(),
        }
    }

    pub fn with_branch<T: Into<String>>(mut self, branch: T) -> Self {
        self.source_handle = Some(branch.into());
        self
    }

    /// Branch label used by switch and approval selection.
    pub fn branch_label(&self) -> Option<&str> {
        self.source_handle
            .as_deref()
            .or(self.label.as_deref())
            .filter(|label| !label.is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.data.is_active
    }
}

/// Serialized shape of a graph, as exchanged with the persistence service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Viewport,
}

/// Immutable snapshot of one document edition's nodes and edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    viewport: Viewport,
    index: HashMap<String, usize>,
    start: usize,
}

impl Graph {
    /// Build a graph, checking id uniqueness, edge endpoints and the single start node.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>, viewport: Viewport) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let mut edge_ids = HashSet::with_capacity(edges.len());
        for edge in &edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(GraphError::DuplicateEdge(edge.id.clone()));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !index.contains_key(endpoint) {
                    return Err(GraphError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        let starts: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Start(_)))
            .map(|(position, _)| position)
            .collect();
        let start = match starts.as_slice() {
            [start] => *start,
            _ => return Err(GraphError::StartNodeCount(starts.len())),
        };

        Ok(Self {
            nodes,
            edges,
            viewport,
            index,
            start,
        })
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        Self::new(snapshot.nodes, snapshot.edges, snapshot.viewport)
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            viewport: self.viewport,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn get_node(&self, id: &str) -> Result<&Node, GraphError> {
        self.index
            .get(id)
            .map(|&position| &self.nodes[position])
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|edge| edge.source == node_id)
            .collect()
    }

    pub fn incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|edge| edge.target == node_id)
            .collect()
    }

    pub fn start_node(&self) -> &Node {
        &self.nodes[self.start]
    }

    /// Return a new graph with one node patched. The receiver is left untouched.
    ///
    /// The patch may edit any attribute except the node id and whether it is the start node.
    pub fn replace_node<F>(&self, id: &str, patch: F) -> Result<Graph, GraphError>
    where
        F: FnOnce(&mut Node),
    {
        let mut next = self.clone();
        let was_start = matches!(self.get_node(id)?.kind, NodeKind::Start(_));
        let node = next.node_mut(id)?;
        patch(node);
        let is_start = matches!(node.kind, NodeKind::Start(_));
        if node.id != id || is_start != was_start {
            return Err(GraphError::IdentityChanged(id.to_string()));
        }
        Ok(next)
    }

    /// Return a new graph with every edge passed through `patch`.
    pub fn replace_edges<F>(&self, mut patch: F) -> Graph
    where
        F: FnMut(&mut Edge),
    {
        let mut next = self.clone();
        for edge in &mut next.edges {
            patch(edge);
        }
        next
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Result<&mut Node, GraphError> {
        match self.index.get(id) {
            Some(&position) => Ok(&mut self.nodes[position]),
            None => Err(GraphError::NodeNotFound(id.to_string())),
        }
    }

    pub(crate) fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    /// Ids of nodes with no path from the start node, sorted.
    pub fn unreachable_nodes(&self) -> Vec<String> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut node_map: HashMap<&str, NodeIndex> = HashMap::new();
        for node in &self.nodes {
            node_map.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (
                node_map.get(edge.source.as_str()),
                node_map.get(edge.target.as_str()),
            ) {
                graph.add_edge(from, to, ());
            }
        }

        let entry = node_map[self.start_node().id.as_str()];
        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&graph, entry);
        while let Some(nx) = bfs.next(&graph) {
            reachable.insert(nx);
        }

        let mut unreachable: Vec<String> = node_map
            .iter()
            .filter(|(_, nx)| !reachable.contains(*nx))
            .map(|(id, _)| id.to_string())
            .collect();
        unreachable.sort();
        unreachable
    }
}
