//! Execution state transitions.
//!
//! Every transition takes a snapshot and returns a new one; nothing is patched in place.
//! [`ExecutionStateStore`] holds the committed snapshot for a session and only swaps it
//! when a transition succeeds.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::graph::{ApprovalValue, Graph, GraphError, Node, NodeKind};
use crate::core::workflow_graph::transition::TransitionConfigError;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid transition on node {node_id}: {reason}")]
    InvalidTransition { node_id: String, reason: String },
    #[error("node {0} is already executed")]
    AlreadyExecuted(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl StoreError {
    fn invalid<T: Into<String>>(node_id: &str, reason: T) -> Self {
        StoreError::InvalidTransition {
            node_id: node_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Graph(graph) => graph.into(),
            StoreError::AlreadyExecuted(_) => {
                AppError::new(ErrorCategory::ValidationError, err.to_string())
                    .with_code("WFG-STATE-002")
            }
            StoreError::InvalidTransition { .. } => {
                AppError::new(ErrorCategory::ValidationError, err.to_string())
                    .with_code("WFG-STATE-001")
            }
        }
    }
}

/// Data recorded on a node at the moment it executes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionEffect {
    pub executed_at: Option<DateTime<Utc>>,
    pub halt: Option<TransitionConfigError>,
}

fn ensure_open(node: &Node) -> Result<(), StoreError> {
    if node.is_executed() {
        return Err(StoreError::AlreadyExecuted(node.id.clone()));
    }
    if !node.is_pending() {
        return Err(StoreError::invalid(&node.id, "node is not pending"));
    }
    Ok(())
}

/// Record an approval decision on a pending approval node.
pub fn mark_approval(graph: &Graph, node_id: &str, approved: bool) -> Result<Graph, StoreError> {
    let mut next = graph.clone();
    let node = next.node_mut(node_id)?;
    ensure_open(node)?;
    match &mut node.kind {
        NodeKind::Action(data) if data.is_approval() => {
            data.is_approved = ApprovalValue::from_decision(approved);
        }
        _ => return Err(StoreError::invalid(node_id, "node is not an approval action")),
    }
    debug!(node_id, approved, "approval recorded");
    Ok(next)
}

/// Set one form value on a pending action node.
pub fn set_form_value(
    graph: &Graph,
    node_id: &str,
    field: &str,
    value: &str,
) -> Result<Graph, StoreError> {
    let mut next = graph.clone();
    let node = next.node_mut(node_id)?;
    ensure_open(node)?;
    match &mut node.kind {
        NodeKind::Action(data) => {
            data.form_values
                .insert(field.to_string(), value.to_string());
        }
        _ => return Err(StoreError::invalid(node_id, "only action nodes carry forms")),
    }
    Ok(next)
}

/// Mark a node executed. Executed is terminal.
pub fn mark_executed(
    graph: &Graph,
    node_id: &str,
    effect: ExecutionEffect,
) -> Result<Graph, StoreError> {
    let mut next = graph.clone();
    let node = next.node_mut(node_id)?;
    if node.is_executed() {
        return Err(StoreError::AlreadyExecuted(node_id.to_string()));
    }
    node.kind.set_executed(true);
    node.kind.set_pending(false);
    match &mut node.kind {
        NodeKind::Integration(data) => data.execution_time = effect.executed_at,
        NodeKind::Switch(data) => data.halted = effect.halt,
        NodeKind::Action(data) => data.halted = effect.halt,
        _ => {}
    }
    debug!(node_id, "node marked executed");
    Ok(next)
}

/// Activate the selected outgoing edges of an executed node and mark their targets pending.
///
/// Every other outgoing edge is deactivated. Targets that already executed stay as they are.
pub fn activate_pending_successors(
    graph: &Graph,
    node_id: &str,
    active_edge_ids: &BTreeSet<String>,
) -> Result<Graph, StoreError> {
    if !graph.get_node(node_id)?.is_executed() {
        return Err(StoreError::invalid(
            node_id,
            "successors can only be activated from an executed node",
        ));
    }

    let mut next = graph.clone();
    let mut targets = Vec::new();
    for edge in next.edges_mut().iter_mut().filter(|edge| edge.source == node_id) {
        edge.data.is_active = active_edge_ids.contains(&edge.id);
        if edge.data.is_active {
            targets.push(edge.target.clone());
        }
    }
    for target in targets {
        let node = next.node_mut(&target)?;
        if !node.is_executed() {
            node.kind.set_pending(true);
            debug!(node_id = %target, from = node_id, "successor pending");
        }
    }
    Ok(next)
}

/// Flag an end node read-only. Allowed after execution.
pub fn mark_readonly(graph: &Graph, node_id: &str) -> Result<Graph, StoreError> {
    let mut next = graph.clone();
    match &mut next.node_mut(node_id)?.kind {
        NodeKind::End(data) => data.is_readonly = true,
        _ => return Err(StoreError::invalid(node_id, "only end nodes can be read-only")),
    }
    Ok(next)
}

/// Committed snapshot of one session plus a monotonically increasing revision.
#[derive(Debug, Clone)]
pub struct ExecutionStateStore {
    current: Arc<Graph>,
    revision: u64,
}

impl ExecutionStateStore {
    pub fn new(graph: Graph) -> Self {
        Self {
            current: Arc::new(graph),
            revision: 0,
        }
    }

    pub fn snapshot(&self) -> Arc<Graph> {
        Arc::clone(&self.current)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Run a transition against the committed snapshot and commit its result on success.
    pub fn apply<F, E>(&mut self, transition: F) -> Result<Arc<Graph>, E>
    where
        F: FnOnce(&Graph) -> Result<Graph, E>,
    {
        let next = transition(&self.current)?;
        Ok(self.commit(next))
    }

    /// Replace the committed snapshot wholesale.
    pub fn commit(&mut self, graph: Graph) -> Arc<Graph> {
        self.current = Arc::new(graph);
        self.revision += 1;
        Arc::clone(&self.current)
    }
}
