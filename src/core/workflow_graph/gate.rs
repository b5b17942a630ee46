//! Preconditions checked before any state-changing action commits.
//!
//! Gates never perform I/O. A failing gate blocks the action locally, before any network
//! call is made.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::form::FormSpec;
use crate::core::workflow_graph::graph::{EndOrigin, EndTarget, Node, NodeKind};
use crate::core::workflow_graph::transition::should_show_form;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("integration node has no integration id")]
    MissingIntegrationId,
    #[error("transfer node has no target flow")]
    MissingTargetFlow,
    #[error("end node does not originate from a flow transfer")]
    WrongOriginKind,
    #[error("required fields are incomplete: {}", .fields.join(", "))]
    IncompleteRequiredFields { fields: Vec<String> },
    #[error("approval has not been decided")]
    ApprovalUndecided,
    #[error("node is already executed")]
    AlreadyExecuted,
    #[error("node is not pending")]
    NodeNotPending,
    #[error("operation does not apply to {kind} nodes")]
    WrongNodeKind { kind: &'static str },
    #[error("end node does not finish the flow directly")]
    WrongEndTarget,
    #[error("node {0} not found")]
    NodeNotFound(String),
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            GateError::MissingIntegrationId => "WFG-GATE-001",
            GateError::MissingTargetFlow => "WFG-GATE-002",
            GateError::WrongOriginKind => "WFG-GATE-003",
            GateError::IncompleteRequiredFields { .. } => "WFG-GATE-004",
            GateError::ApprovalUndecided => "WFG-GATE-005",
            GateError::AlreadyExecuted => "WFG-GATE-006",
            GateError::NodeNotPending => "WFG-GATE-007",
            GateError::WrongNodeKind { .. } => "WFG-GATE-008",
            GateError::WrongEndTarget => "WFG-GATE-009",
            GateError::NodeNotFound(_) => "WFG-GATE-404",
        }
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        let code = err.code();
        AppError::new(ErrorCategory::GateError, err.to_string()).with_code(code)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

/// The node must be pending and not yet executed.
pub fn ensure_actionable(node: &Node) -> Result<(), GateError> {
    if node.is_executed() {
        return Err(GateError::AlreadyExecuted);
    }
    if !node.is_pending() {
        return Err(GateError::NodeNotPending);
    }
    Ok(())
}

/// Required form fields that block an approval commit, with their names.
pub fn check_commit_approval(
    node: &Node,
    form_values: &IndexMap<String, String>,
) -> Result<(), GateError> {
    let NodeKind::Action(data) = &node.kind else {
        return Ok(());
    };
    if !data.is_pending_connected || !should_show_form(node) {
        return Ok(());
    }
    let Some(form) = data.attached_form.as_ref().and_then(FormSpec::parse_lenient) else {
        return Ok(());
    };
    let missing = form.missing_fields(form_values);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GateError::IncompleteRequiredFields { fields: missing })
    }
}

pub fn can_commit_approval(node: &Node, form_values: &IndexMap<String, String>) -> bool {
    check_commit_approval(node, form_values).is_ok()
}

pub fn can_execute_integration(node: &Node) -> Result<(), GateError> {
    match &node.kind {
        NodeKind::Integration(data) if is_blank(data.integration_id.as_deref()) => {
            Err(GateError::MissingIntegrationId)
        }
        NodeKind::Integration(_) => Ok(()),
        other => Err(GateError::WrongNodeKind { kind: other.name() }),
    }
}

pub fn can_execute_transfer(node: &Node) -> Result<(), GateError> {
    match &node.kind {
        NodeKind::End(data) => {
            if is_blank(data.to_flow_id.as_deref()) {
                return Err(GateError::MissingTargetFlow);
            }
            if data.from_type != EndOrigin::TransferFlow {
                return Err(GateError::WrongOriginKind);
            }
            Ok(())
        }
        other => Err(GateError::WrongNodeKind { kind: other.name() }),
    }
}

pub fn can_conclude(node: &Node) -> Result<(), GateError> {
    match &node.kind {
        NodeKind::End(data) if data.to_type == EndTarget::DirectFinish => Ok(()),
        NodeKind::End(_) => Err(GateError::WrongEndTarget),
        other => Err(GateError::WrongNodeKind { kind: other.name() }),
    }
}

/// Gate for manually executing a step (start, action, document reference, switch).
pub fn can_execute_step(node: &Node) -> Result<(), GateError> {
    ensure_actionable(node)?;
    match &node.kind {
        NodeKind::Action(data) => {
            if data.is_approval() && !data.is_approved.is_decided() {
                return Err(GateError::ApprovalUndecided);
            }
            check_commit_approval(node, &data.form_values)
        }
        NodeKind::Start(_) | NodeKind::DocumentRef(_) | NodeKind::Switch(_) => Ok(()),
        NodeKind::End(_) | NodeKind::Integration(_) => {
            Err(GateError::WrongNodeKind {
                kind: node.kind.name(),
            })
        }
    }
}
