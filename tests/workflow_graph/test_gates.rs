use docflow::core::error::AppError;
use docflow::core::types::{ErrorCategory, ErrorSeverity};
use docflow::core::workflow_graph::form::{FormSpec, ShowCondition};
use docflow::core::workflow_graph::gate::{self, GateError};
use docflow::core::workflow_graph::graph::{
    ActionData, ApprovalValue, DocumentRefData, EndData, EndOrigin, EndTarget, IntegrationData,
    Node, NodeKind, SwitchData,
};
use docflow::core::workflow_graph::transition;
use indexmap::IndexMap;
use serde_json::{json, Value};

fn approval_node(form: Value, value: ApprovalValue) -> Node {
    Node::new(
        "approval",
        NodeKind::Action(ActionData {
            action_type: "InternalApproval".into(),
            is_approved: value,
            is_pending_connected: true,
            attached_form: Some(form),
            ..ActionData::default()
        }),
    )
}

fn values(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn empty_required_field_blocks_commit() {
    let node = approval_node(
        json!({"fields": {"Reason": {"label": "Reason", "required": true}}}),
        ApprovalValue::True,
    );
    assert!(!gate::can_commit_approval(&node, &values(&[("Reason", "")])));
    assert_eq!(
        gate::check_commit_approval(&node, &values(&[("Reason", "  ")])),
        Err(GateError::IncompleteRequiredFields {
            fields: vec!["Reason".into()]
        })
    );
    assert!(gate::can_commit_approval(
        &node,
        &values(&[("Reason", "budget approved")])
    ));
}

#[test]
fn placeholders_and_template_tokens_do_not_count() {
    let node = approval_node(
        json!(r#"{"fields": [
            {"name": "Amount", "placeholder": "0.00"},
            {"name": "Owner"},
            {"name": "Notes", "required": false}
        ]}"#),
        ApprovalValue::True,
    );
    let err = gate::check_commit_approval(
        &node,
        &values(&[("Amount", "0.00"), ("Owner", "{{owner}}")]),
    )
    .unwrap_err();
    assert_eq!(
        err,
        GateError::IncompleteRequiredFields {
            fields: vec!["Amount".into(), "Owner".into()]
        }
    );
    let app_error: AppError = err.into();
    assert_eq!(app_error.code, "WFG-GATE-004");
    assert_eq!(app_error.category, ErrorCategory::GateError);
    assert_eq!(app_error.severity(), ErrorSeverity::Warning);
}

#[test]
fn hidden_form_does_not_gate_commit() {
    let node = approval_node(
        json!({"showCondition": "FALSE", "fields": {"Reason": {"required": true}}}),
        ApprovalValue::True,
    );
    assert!(gate::can_commit_approval(&node, &IndexMap::new()));
}

#[test]
fn rejected_approval_with_false_condition_commits_without_values() {
    let node = approval_node(
        json!({"showCondition": "FALSE", "fields": {"Reason": {"required": true}}}),
        ApprovalValue::False,
    );
    assert!(!transition::should_show_form(&node));
    assert!(gate::can_commit_approval(&node, &IndexMap::new()));
}

#[test]
fn true_condition_gates_only_approved_decisions() {
    let rejected = approval_node(
        json!({"showCondition": "TRUE", "fields": {"Reason": {"required": true}}}),
        ApprovalValue::False,
    );
    assert!(gate::can_commit_approval(&rejected, &IndexMap::new()));

    let approved = approval_node(
        json!({"showCondition": "TRUE", "fields": {"Reason": {"required": true}}}),
        ApprovalValue::True,
    );
    assert!(transition::should_show_form(&approved));
    assert!(!gate::can_commit_approval(&approved, &IndexMap::new()));
}

#[test]
fn transfer_without_target_flow_is_blocked() {
    let node = Node::new(
        "handoff",
        NodeKind::End(EndData {
            from_type: EndOrigin::TransferFlow,
            to_type: EndTarget::TransferFlow,
            to_flow_id: None,
            is_pending_connected: true,
            ..EndData::default()
        }),
    );
    assert_eq!(
        gate::can_execute_transfer(&node),
        Err(GateError::MissingTargetFlow)
    );
}

#[test]
fn transfer_gate_rejects_other_kinds() {
    let node = Node::new("doc", NodeKind::DocumentRef(DocumentRefData::default()));
    assert_eq!(
        gate::can_execute_transfer(&node),
        Err(GateError::WrongNodeKind { kind: "document" })
    );
}

#[test]
fn integration_requires_an_id() {
    let missing = Node::new("i", NodeKind::Integration(IntegrationData::default()));
    assert_eq!(
        gate::can_execute_integration(&missing),
        Err(GateError::MissingIntegrationId)
    );
    let configured = Node::new(
        "i",
        NodeKind::Integration(IntegrationData {
            integration_id: Some("crm".into()),
            ..IntegrationData::default()
        }),
    );
    assert!(gate::can_execute_integration(&configured).is_ok());
}

#[test]
fn conclude_requires_direct_finish_end() {
    let finish = Node::new("end", NodeKind::End(EndData::default()));
    assert!(gate::can_conclude(&finish).is_ok());
    let transfer = Node::new(
        "end",
        NodeKind::End(EndData {
            to_type: EndTarget::TransferFlow,
            ..EndData::default()
        }),
    );
    assert_eq!(gate::can_conclude(&transfer), Err(GateError::WrongEndTarget));
}

#[test]
fn execute_step_requires_pending_node() {
    let switch = Node::new(
        "s",
        NodeKind::Switch(SwitchData {
            switch_field: "region".into(),
            ..SwitchData::default()
        }),
    );
    assert_eq!(
        gate::can_execute_step(&switch),
        Err(GateError::NodeNotPending)
    );
    let end = Node::new(
        "end",
        NodeKind::End(EndData {
            is_pending_connected: true,
            ..EndData::default()
        }),
    );
    assert_eq!(
        gate::can_execute_step(&end),
        Err(GateError::WrongNodeKind { kind: "end" })
    );
}

#[test]
fn malformed_form_parses_to_nothing() {
    assert!(FormSpec::parse(&json!("{\"fields\": 12")).is_err());
    assert!(FormSpec::parse_lenient(&json!(42)).is_none());
    let spec = FormSpec::parse(&json!({"showCondition": "BOTH", "fields": {}})).unwrap();
    assert_eq!(spec.show_condition, Some(ShowCondition::Both));
}
