//! Branch selection for executed nodes.
//!
//! Everything here is a pure function of the graph snapshot; committing the result is the
//! store's job.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::form::{FormSpec, ShowCondition};
use crate::core::workflow_graph::graph::{ApprovalValue, Edge, Graph, GraphError, Node, NodeKind};
use crate::core::workflow_graph::store::{self, ExecutionEffect, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Misconfigured branching. The node still executes but nothing downstream activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TransitionConfigError {
    #[error("no outgoing branch matches '{value}'")]
    ZeroActiveBranches { value: String },
    #[error("{count} outgoing branches match '{value}'")]
    MultipleActiveBranches { value: String, count: usize },
}

impl From<TransitionConfigError> for AppError {
    fn from(err: TransitionConfigError) -> Self {
        let code = match &err {
            TransitionConfigError::ZeroActiveBranches { .. } => "WFG-BRANCH-001",
            TransitionConfigError::MultipleActiveBranches { .. } => "WFG-BRANCH-002",
        };
        AppError::new(ErrorCategory::TransitionError, err.to_string()).with_code(code)
    }
}

/// Result of evaluating an executed node's outgoing edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    Activate(BTreeSet<String>),
    Halted(TransitionConfigError),
}

impl BranchOutcome {
    pub fn active_edges(&self) -> BTreeSet<String> {
        match self {
            BranchOutcome::Activate(edges) => edges.clone(),
            BranchOutcome::Halted(_) => BTreeSet::new(),
        }
    }

    pub fn halt(&self) -> Option<&TransitionConfigError> {
        match self {
            BranchOutcome::Activate(_) => None,
            BranchOutcome::Halted(err) => Some(err),
        }
    }
}

/// Compute which outgoing edges of `node_id` activate once it executes.
pub fn evaluate(graph: &Graph, node_id: &str) -> Result<BranchOutcome, GraphError> {
    let node = graph.get_node(node_id)?;
    let outgoing = graph.outgoing_edges(node_id);
    let outcome = match &node.kind {
        NodeKind::Switch(data) => {
            select_single(&outgoing, &data.input_switch, |label| label == data.input_switch)
        }
        NodeKind::Action(data) if data.is_approval() => {
            if outgoing.iter().all(|edge| edge.branch_label().is_none()) {
                activate_all(&outgoing)
            } else {
                match data.is_approved.branch_label() {
                    Some(expected) => select_single(&outgoing, expected, |label| {
                        label.eq_ignore_ascii_case(expected)
                    }),
                    None => BranchOutcome::Halted(TransitionConfigError::ZeroActiveBranches {
                        value: "UNDEFINED".to_string(),
                    }),
                }
            }
        }
        _ => activate_all(&outgoing),
    };
    debug!(node_id, kind = node.kind.name(), ?outcome, "evaluated branch outcome");
    Ok(outcome)
}

fn activate_all(outgoing: &[&Edge]) -> BranchOutcome {
    BranchOutcome::Activate(outgoing.iter().map(|edge| edge.id.clone()).collect())
}

fn select_single<F>(outgoing: &[&Edge], value: &str, matches: F) -> BranchOutcome
where
    F: Fn(&str) -> bool,
{
    let selected: BTreeSet<String> = outgoing
        .iter()
        .filter(|edge| edge.branch_label().is_some_and(&matches))
        .map(|edge| edge.id.clone())
        .collect();
    match selected.len() {
        1 => BranchOutcome::Activate(selected),
        0 => BranchOutcome::Halted(TransitionConfigError::ZeroActiveBranches {
            value: value.to_string(),
        }),
        count => BranchOutcome::Halted(TransitionConfigError::MultipleActiveBranches {
            value: value.to_string(),
            count,
        }),
    }
}

/// Whether the node's attached form is visible for its current approval value.
///
/// `TRUE` shows the form once approved, `BOTH` once decided either way, and `FALSE`
/// switches it off. A hidden form is exempt from the required-field gate.
pub fn should_show_form(node: &Node) -> bool {
    let NodeKind::Action(data) = &node.kind else {
        return true;
    };
    if !data.is_approval() {
        return true;
    }
    let condition = data
        .attached_form
        .as_ref()
        .and_then(FormSpec::parse_lenient)
        .and_then(|form| form.show_condition);
    match (condition, data.is_approved) {
        (None, _) => true,
        (Some(ShowCondition::True), ApprovalValue::True) => true,
        (Some(ShowCondition::Both), ApprovalValue::True | ApprovalValue::False) => true,
        (Some(ShowCondition::False), _) => false,
        (Some(_), ApprovalValue::Undefined | ApprovalValue::False) => false,
    }
}

/// Graph produced by executing one node, together with how its branches resolved.
#[derive(Debug, Clone)]
pub struct Advance {
    pub graph: Graph,
    pub outcome: BranchOutcome,
}

/// Execute `node_id`: select branches, mark the node executed and activate successors.
pub fn advance(
    graph: &Graph,
    node_id: &str,
    executed_at: Option<DateTime<Utc>>,
) -> Result<Advance, StoreError> {
    let outcome = evaluate(graph, node_id)?;
    if let Some(halt) = outcome.halt() {
        warn!(node_id, "flow halted: {}", halt);
    }
    let effect = ExecutionEffect {
        executed_at,
        halt: outcome.halt().cloned(),
    };
    let executed = store::mark_executed(graph, node_id, effect)?;
    let activated = store::activate_pending_successors(&executed, node_id, &outcome.active_edges())?;
    Ok(Advance {
        graph: activated,
        outcome,
    })
}
