use docflow::core::workflow_graph::graph::{
    ActionData, ApprovalValue, Edge, EndData, Graph, Node, NodeKind, StartData, SwitchData,
};
use docflow::core::workflow_graph::store::{self, StoreError};
use docflow::core::workflow_graph::transition::{self, BranchOutcome, TransitionConfigError};
use docflow_types::Viewport;
use std::collections::BTreeSet;

fn executed_start() -> Node {
    Node::new(
        "start",
        NodeKind::Start(StartData {
            is_executed: true,
            is_pending_connected: false,
        }),
    )
}

fn task(id: &str) -> Node {
    Node::new(
        id,
        NodeKind::Action(ActionData {
            action_type: "Task".into(),
            ..ActionData::default()
        }),
    )
}

/// start -> switch(region) -> {eu, us}
fn region_graph(input: &str) -> Graph {
    Graph::new(
        vec![
            executed_start(),
            Node::new(
                "region",
                NodeKind::Switch(SwitchData {
                    switch_field: "region".into(),
                    input_switch: input.into(),
                    is_pending_connected: true,
                    ..SwitchData::default()
                }),
            ),
            task("eu"),
            task("us"),
        ],
        vec![
            Edge::new("to-switch", "start", "region"),
            Edge::new("to-eu", "region", "eu").with_branch("EU"),
            Edge::new("to-us", "region", "us").with_branch("US"),
        ],
        Viewport::default(),
    )
    .unwrap()
}

/// start -> approval -> {approved, rejected}
fn approval_graph(labels: Option<(&str, &str)>) -> Graph {
    let mut yes = Edge::new("yes", "approval", "approved");
    let mut no = Edge::new("no", "approval", "rejected");
    if let Some((approve_label, reject_label)) = labels {
        yes.label = Some(approve_label.into());
        no.label = Some(reject_label.into());
    }
    Graph::new(
        vec![
            executed_start(),
            Node::new(
                "approval",
                NodeKind::Action(ActionData {
                    action_type: "ManagerApproval".into(),
                    is_pending_connected: true,
                    ..ActionData::default()
                }),
            ),
            task("approved"),
            Node::new("rejected", NodeKind::End(EndData::default())),
        ],
        vec![Edge::new("in", "start", "approval"), yes, no],
        Viewport::default(),
    )
    .unwrap()
}

fn pending(graph: &Graph, id: &str) -> bool {
    graph.get_node(id).unwrap().is_pending()
}

#[test]
fn switch_activates_exactly_the_matching_branch() {
    let advance = transition::advance(&region_graph("EU"), "region", None).unwrap();
    let graph = advance.graph;

    let active: Vec<&str> = graph
        .outgoing_edges("region")
        .into_iter()
        .filter(|edge| edge.is_active())
        .map(|edge| edge.id.as_str())
        .collect();
    assert_eq!(active, vec!["to-eu"]);
    assert!(pending(&graph, "eu"));
    assert!(!pending(&graph, "us"));
    assert!(graph.get_node("region").unwrap().is_executed());
    assert!(!pending(&graph, "region"));
}

#[test]
fn switch_without_match_halts_but_executes() {
    let advance = transition::advance(&region_graph("APAC"), "region", None).unwrap();
    assert_eq!(
        advance.outcome,
        BranchOutcome::Halted(TransitionConfigError::ZeroActiveBranches {
            value: "APAC".into()
        })
    );
    let node = advance.graph.get_node("region").unwrap();
    assert!(node.is_executed());
    assert!(node.kind.halted().is_some());
    assert!(!pending(&advance.graph, "eu"));
    assert!(!pending(&advance.graph, "us"));
}

#[test]
fn switch_match_is_case_sensitive() {
    let outcome = transition::evaluate(&region_graph("eu"), "region").unwrap();
    assert!(matches!(
        outcome,
        BranchOutcome::Halted(TransitionConfigError::ZeroActiveBranches { .. })
    ));
}

#[test]
fn approval_branch_labels_ignore_case() {
    let graph = approval_graph(Some(("True", "FALSE")));
    let graph = store::mark_approval(&graph, "approval", false).unwrap();
    let advance = transition::advance(&graph, "approval", None).unwrap();
    assert_eq!(
        advance.outcome,
        BranchOutcome::Activate(BTreeSet::from(["no".to_string()]))
    );
    assert!(pending(&advance.graph, "rejected"));
    assert!(!pending(&advance.graph, "approved"));
}

#[test]
fn unlabelled_approval_is_linear() {
    let graph = approval_graph(None);
    let graph = store::mark_approval(&graph, "approval", true).unwrap();
    let outcome = transition::evaluate(&graph, "approval").unwrap();
    assert_eq!(outcome.active_edges().len(), 2);
}

#[test]
fn undecided_approval_halts() {
    let outcome = transition::evaluate(&approval_graph(Some(("true", "false"))), "approval")
        .unwrap();
    assert_eq!(
        outcome.halt(),
        Some(&TransitionConfigError::ZeroActiveBranches {
            value: "UNDEFINED".into()
        })
    );
}

#[test]
fn approval_is_frozen_once_executed() {
    let graph = approval_graph(Some(("true", "false")));
    let graph = store::mark_approval(&graph, "approval", true).unwrap();
    let executed = transition::advance(&graph, "approval", None).unwrap().graph;

    assert_eq!(
        store::mark_approval(&executed, "approval", false).unwrap_err(),
        StoreError::AlreadyExecuted("approval".into())
    );
    assert_eq!(
        store::set_form_value(&executed, "approval", "Reason", "late").unwrap_err(),
        StoreError::AlreadyExecuted("approval".into())
    );
    match &executed.get_node("approval").unwrap().kind {
        NodeKind::Action(data) => assert_eq!(data.is_approved, ApprovalValue::True),
        other => panic!("unexpected kind {:?}", other),
    }
}

#[test]
fn approval_cannot_change_before_activation() {
    let graph = approval_graph(None);
    let graph = graph
        .replace_node("approval", |node| {
            if let NodeKind::Action(data) = &mut node.kind {
                data.is_pending_connected = false;
            }
        })
        .unwrap();
    assert!(matches!(
        store::mark_approval(&graph, "approval", true),
        Err(StoreError::InvalidTransition { .. })
    ));
}

#[test]
fn activation_does_not_reopen_executed_targets() {
    let graph = transition::advance(&region_graph("EU"), "region", None)
        .unwrap()
        .graph;
    let graph = transition::advance(&graph, "eu", None).unwrap().graph;
    let again = store::activate_pending_successors(
        &graph,
        "region",
        &BTreeSet::from(["to-eu".to_string()]),
    )
    .unwrap();
    let eu = again.get_node("eu").unwrap();
    assert!(eu.is_executed());
    assert!(!eu.is_pending());
}
