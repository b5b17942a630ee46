//! Side-effecting operations on one open flow edition.
//!
//! Every operation returns an [`ActionResult`] and publishes it on the session's event
//! channel. Nothing propagates past this boundary: gate failures, halted branches and
//! gateway errors all become `error` results.
//!
//! Session state sits behind an async `RwLock` that is never held across a gateway call.
//! Each node has its own invocation state (`Idle -> Invoking -> Success | Error`); a second
//! call while the first is still invoking reports `pending` and does nothing.

use crate::core::config::SessionConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::gate::{self, GateError};
use crate::core::workflow_graph::gateway::{
    GatewayError, GraphUpdate, IntegrationRequest, PersistenceGateway, TransferRequest,
};
use crate::core::workflow_graph::graph::{Graph, GraphError, Node, NodeKind};
use crate::core::workflow_graph::render::{self, Palette, RenderGraph};
use crate::core::workflow_graph::store::{self, ExecutionEffect, ExecutionStateStore, StoreError};
use crate::core::workflow_graph::transition::{self, TransitionConfigError};
use chrono::Utc;
use docflow_types::{ActionResult, ActionStatus, DocumentStatus};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Identity of the flow edition a session drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowContext {
    pub flow_id: String,
    pub document_id: String,
}

impl FlowContext {
    pub fn new<F: Into<String>, D: Into<String>>(flow_id: F, document_id: D) -> Self {
        Self {
            flow_id: flow_id.into(),
            document_id: document_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationState {
    #[default]
    Idle,
    Invoking,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SetApproval,
    SetFormValue,
    CommitApproval,
    ExecuteStep,
    InvokeIntegration,
    TransferFlow,
    RetryTransfer,
    ConcludeFlow,
    Flush,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SetApproval => "set_approval",
            Operation::SetFormValue => "set_form_value",
            Operation::CommitApproval => "commit_approval",
            Operation::ExecuteStep => "execute_step",
            Operation::InvokeIntegration => "invoke_integration",
            Operation::TransferFlow => "transfer_flow",
            Operation::RetryTransfer => "retry_transfer",
            Operation::ConcludeFlow => "conclude_flow",
            Operation::Flush => "flush",
        }
    }
}

/// Notifications published to session subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    GraphCommitted {
        revision: u64,
    },
    ActionReported {
        node_id: Option<String>,
        operation: Operation,
        result: ActionResult,
    },
}

/// Internal failure of one operation. Always reported as an `error` result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("flow halted: {0}")]
    Halted(TransitionConfigError),
    #[error("saved locally but not persisted: {0}")]
    Unsaved(GatewayError),
    #[error("node {0} has no unconfirmed transfer")]
    NoUnconfirmedTransfer(String),
    #[error("session is closed")]
    Closed,
}

impl From<GraphError> for ExecutorError {
    fn from(err: GraphError) -> Self {
        ExecutorError::Store(StoreError::Graph(err))
    }
}

impl From<ExecutorError> for AppError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Gate(err) => err.into(),
            ExecutorError::Store(err) => err.into(),
            ExecutorError::Gateway(err) => err.into(),
            ExecutorError::Halted(err) => err.into(),
            ExecutorError::Unsaved(inner) => {
                let mut app_error = AppError::from(inner);
                app_error.add_context("persisted", "false");
                app_error
            }
            ExecutorError::NoUnconfirmedTransfer(_) => {
                AppError::new(ErrorCategory::ValidationError, err.to_string())
                    .with_code("WFG-EXEC-001")
            }
            ExecutorError::Closed => AppError::new(ErrorCategory::InternalError, err.to_string())
                .with_code("WFG-EXEC-002"),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    store: ExecutionStateStore,
    invocations: HashMap<String, InvocationState>,
    unsaved: bool,
    unconfirmed_transfers: HashSet<String>,
    linked_flow_name: Option<String>,
    closed: bool,
}

impl SessionState {
    fn invocation(&self, node_id: &str) -> InvocationState {
        self.invocations.get(node_id).copied().unwrap_or_default()
    }

    fn is_invoking(&self, node_id: &str) -> bool {
        self.invocation(node_id) == InvocationState::Invoking
    }
}

enum Begin {
    Started,
    Busy,
    Closed,
}

/// Executes actions against one open flow edition.
#[derive(Clone)]
pub struct ActionExecutor {
    context: FlowContext,
    gateway: Arc<dyn PersistenceGateway>,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<EngineEvent>,
}

impl ActionExecutor {
    /// Open a session on a materialized or previously persisted graph.
    pub fn open(
        context: FlowContext,
        graph: Graph,
        gateway: Arc<dyn PersistenceGateway>,
        config: &SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        info!(
            flow_id = %context.flow_id,
            document_id = %context.document_id,
            nodes = graph.nodes().len(),
            "flow session opened"
        );
        Self {
            context,
            gateway,
            state: Arc::new(RwLock::new(SessionState {
                store: ExecutionStateStore::new(graph),
                invocations: HashMap::new(),
                unsaved: false,
                unconfirmed_transfers: HashSet::new(),
                linked_flow_name: None,
                closed: false,
            })),
            events,
        }
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Arc<Graph> {
        self.state.read().await.store.snapshot()
    }

    pub async fn revision(&self) -> u64 {
        self.state.read().await.store.revision()
    }

    /// Whether local changes exist that the persistence service has not acknowledged.
    pub async fn is_unsaved(&self) -> bool {
        self.state.read().await.unsaved
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    pub async fn invocation_state(&self, node_id: &str) -> InvocationState {
        self.state.read().await.invocation(node_id)
    }

    /// End nodes whose transfer executed locally but was never confirmed.
    pub async fn unconfirmed_transfers(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .state
            .read()
            .await
            .unconfirmed_transfers
            .iter()
            .cloned()
            .collect();
        nodes.sort();
        nodes
    }

    /// Name of the flow this edition was transferred into, once confirmed.
    pub async fn linked_flow_name(&self) -> Option<String> {
        self.state.read().await.linked_flow_name.clone()
    }

    pub async fn render(&self, palette: &Palette) -> RenderGraph {
        let graph = self.snapshot().await;
        render::project(&graph, palette)
    }

    /// Discard the session. Results of calls still in flight are dropped silently.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        state.invocations.clear();
        info!(flow_id = %self.context.flow_id, "flow session closed");
    }

    /// Record an approval decision locally. The session becomes unsaved.
    pub async fn set_approval(&self, node_id: &str, approved: bool) -> ActionResult {
        self.local_edit(node_id, Operation::SetApproval, |graph| {
            store::mark_approval(graph, node_id, approved)
        })
        .await
    }

    /// Record one form value locally. The session becomes unsaved.
    pub async fn set_form_value(&self, node_id: &str, field: &str, value: &str) -> ActionResult {
        self.local_edit(node_id, Operation::SetFormValue, |graph| {
            store::set_form_value(graph, node_id, field, value)
        })
        .await
    }

    /// Persist the approval decision and form values after the required-field gate.
    pub async fn commit_approval(&self, node_id: &str) -> ActionResult {
        self.invoke(node_id, Operation::CommitApproval, self.run_commit_approval(node_id))
            .await
    }

    /// Execute a start, action, document reference or switch node and advance the flow.
    pub async fn execute_step(&self, node_id: &str) -> ActionResult {
        self.invoke(node_id, Operation::ExecuteStep, self.run_execute_step(node_id))
            .await
    }

    /// Call the node's external integration. Nothing changes locally unless the call succeeds.
    pub async fn invoke_integration(&self, node_id: &str) -> ActionResult {
        self.invoke(
            node_id,
            Operation::InvokeIntegration,
            self.run_invoke_integration(node_id),
        )
        .await
    }

    /// Hand the document over to the end node's target flow.
    ///
    /// The node is marked executed before the request goes out. If the request fails it
    /// stays executed and is recorded as an unconfirmed transfer for [`Self::retry_transfer`].
    pub async fn transfer_flow(&self, node_id: &str) -> ActionResult {
        self.invoke(node_id, Operation::TransferFlow, self.run_transfer_flow(node_id))
            .await
    }

    pub async fn retry_transfer(&self, node_id: &str) -> ActionResult {
        self.invoke(node_id, Operation::RetryTransfer, self.run_retry_transfer(node_id))
            .await
    }

    /// Finish the flow. The local state only changes once both persistence calls succeed.
    pub async fn conclude_flow(&self, node_id: &str) -> ActionResult {
        self.invoke(node_id, Operation::ConcludeFlow, self.run_conclude_flow(node_id))
            .await
    }

    /// Persist the current snapshot.
    pub async fn flush(&self) -> ActionResult {
        if self.is_closed().await {
            return ActionResult::error(ExecutorError::Closed.to_string());
        }
        let outcome = match self.persist_current().await {
            Ok(()) => Ok("flow saved".to_string()),
            Err(err) => Err(err),
        };
        self.report(None, Operation::Flush, outcome).await
    }

    async fn local_edit<F>(&self, node_id: &str, operation: Operation, transition: F) -> ActionResult
    where
        F: FnOnce(&Graph) -> Result<Graph, StoreError>,
    {
        let outcome = {
            let mut state = self.state.write().await;
            if state.closed {
                return ActionResult::error(ExecutorError::Closed.to_string());
            }
            if state.is_invoking(node_id) {
                drop(state);
                return self
                    .publish(Some(node_id), operation, ActionResult::pending(busy(node_id)))
                    .await;
            }
            match state.store.apply(transition) {
                Ok(_) => {
                    state.unsaved = true;
                    self.notify_commit(state.store.revision());
                    Ok(format!("{} updated", node_id))
                }
                Err(err) => Err(ExecutorError::from(err)),
            }
        };
        self.report(Some(node_id), operation, outcome).await
    }

    async fn run_commit_approval(&self, node_id: &str) -> Result<String, ExecutorError> {
        let graph = self.snapshot().await;
        let node = graph.get_node(node_id)?;
        gate::ensure_actionable(node)?;
        let NodeKind::Action(data) = &node.kind else {
            return Err(GateError::WrongNodeKind {
                kind: node.kind.name(),
            }
            .into());
        };
        gate::check_commit_approval(node, &data.form_values)?;
        self.persist_current().await?;
        Ok(format!("approval on {} saved", node_id))
    }

    async fn run_execute_step(&self, node_id: &str) -> Result<String, ExecutorError> {
        let outcome = {
            let mut state = self.state.write().await;
            let graph = state.store.snapshot();
            gate::can_execute_step(graph.get_node(node_id)?)?;
            let advance = transition::advance(&graph, node_id, Some(Utc::now()))?;
            state.store.commit(advance.graph);
            state.unsaved = true;
            self.notify_commit(state.store.revision());
            advance.outcome
        };
        self.persist_current().await?;
        match outcome.halt() {
            Some(halt) => Err(ExecutorError::Halted(halt.clone())),
            None => Ok(format!(
                "{} executed, {} branch(es) activated",
                node_id,
                outcome.active_edges().len()
            )),
        }
    }

    async fn run_invoke_integration(&self, node_id: &str) -> Result<String, ExecutorError> {
        let integration_id = {
            let graph = self.snapshot().await;
            let node = graph.get_node(node_id)?;
            gate::ensure_actionable(node)?;
            gate::can_execute_integration(node)?;
            match &node.kind {
                NodeKind::Integration(data) => data.integration_id.clone().unwrap_or_default(),
                _ => String::new(),
            }
        };

        let config = self.gateway.fetch_integration(&integration_id).await?;
        let name = config.name.clone();
        let request = IntegrationRequest {
            document_id: self.context.document_id.clone(),
            flow_id: self.context.flow_id.clone(),
            node_id: node_id.to_string(),
            config,
        };
        let response = self
            .gateway
            .invoke_integration(&integration_id, &request)
            .await?;

        {
            let mut state = self.state.write().await;
            if state.closed {
                return Err(ExecutorError::Closed);
            }
            state.store.apply(|graph| {
                transition::advance(graph, node_id, Some(Utc::now())).map(|advance| advance.graph)
            })?;
            state.unsaved = true;
            self.notify_commit(state.store.revision());
        }
        self.persist_current().await?;
        Ok(response
            .message
            .unwrap_or_else(|| format!("integration {} executed", name)))
    }

    async fn run_transfer_flow(&self, node_id: &str) -> Result<String, ExecutorError> {
        let (target_flow_id, graph) = {
            let mut state = self.state.write().await;
            let current = state.store.snapshot();
            let node = current.get_node(node_id)?;
            gate::ensure_actionable(node)?;
            gate::can_execute_transfer(node)?;
            let target = target_flow(node);
            let effect = ExecutionEffect {
                executed_at: Some(Utc::now()),
                halt: None,
            };
            let graph = state
                .store
                .apply(|graph| store::mark_executed(graph, node_id, effect))?;
            state.unconfirmed_transfers.insert(node_id.to_string());
            state.unsaved = true;
            self.notify_commit(state.store.revision());
            (target, graph)
        };
        self.confirm_transfer(node_id, target_flow_id, &graph).await
    }

    async fn run_retry_transfer(&self, node_id: &str) -> Result<String, ExecutorError> {
        let (target_flow_id, graph) = {
            let state = self.state.read().await;
            if !state.unconfirmed_transfers.contains(node_id) {
                return Err(ExecutorError::NoUnconfirmedTransfer(node_id.to_string()));
            }
            let graph = state.store.snapshot();
            let target = target_flow(graph.get_node(node_id)?);
            (target, graph)
        };
        self.confirm_transfer(node_id, target_flow_id, &graph).await
    }

    async fn confirm_transfer(
        &self,
        node_id: &str,
        target_flow_id: String,
        graph: &Graph,
    ) -> Result<String, ExecutorError> {
        let request = TransferRequest {
            current_document_id: self.context.document_id.clone(),
            target_flow_id,
            flow_tasks: graph.to_snapshot(),
        };
        let response = self.gateway.transfer_flow(&request).await?;

        let mut state = self.state.write().await;
        if state.closed {
            return Err(ExecutorError::Closed);
        }
        state
            .store
            .apply(|graph| store::mark_readonly(graph, node_id))?;
        state.unconfirmed_transfers.remove(node_id);
        state.linked_flow_name = Some(response.target_flow_name.clone());
        state.unsaved = true;
        self.notify_commit(state.store.revision());
        Ok(format!("flow transferred to {}", response.target_flow_name))
    }

    async fn run_conclude_flow(&self, node_id: &str) -> Result<String, ExecutorError> {
        let completed_at = Utc::now();
        let effect = ExecutionEffect {
            executed_at: Some(completed_at),
            halt: None,
        };
        let (candidate, base_revision) = {
            let state = self.state.read().await;
            let graph = state.store.snapshot();
            let node = graph.get_node(node_id)?;
            gate::ensure_actionable(node)?;
            gate::can_conclude(node)?;
            let candidate = store::mark_executed(&graph, node_id, effect.clone())?;
            (candidate, state.store.revision())
        };

        let update = GraphUpdate::concluded(candidate.to_snapshot(), completed_at);
        self.gateway
            .update_graph(&self.context.flow_id, &update)
            .await?;
        self.gateway
            .update_document_status(&self.context.document_id, DocumentStatus::Concluded)
            .await?;

        let mut state = self.state.write().await;
        if state.closed {
            return Err(ExecutorError::Closed);
        }
        if state.store.revision() == base_revision {
            state.store.commit(candidate);
            state.unsaved = false;
        } else {
            // Local edits landed while the flow was being concluded; keep them.
            state
                .store
                .apply(|graph| store::mark_executed(graph, node_id, effect))?;
            state.unsaved = true;
        }
        self.notify_commit(state.store.revision());
        Ok("flow concluded".to_string())
    }

    /// Save the current snapshot. Clears `unsaved` only if nothing changed meanwhile.
    async fn persist_current(&self) -> Result<(), ExecutorError> {
        let (graph, revision) = {
            let state = self.state.read().await;
            if state.closed {
                return Err(ExecutorError::Closed);
            }
            (state.store.snapshot(), state.store.revision())
        };
        let update = GraphUpdate::in_progress(graph.to_snapshot());
        let result = self.gateway.update_graph(&self.context.flow_id, &update).await;

        let mut state = self.state.write().await;
        if state.closed {
            return Err(ExecutorError::Closed);
        }
        match result {
            Ok(()) => {
                if state.store.revision() == revision {
                    state.unsaved = false;
                }
                debug!(flow_id = %self.context.flow_id, revision, "flow graph persisted");
                Ok(())
            }
            Err(err) => {
                state.unsaved = true;
                Err(ExecutorError::Unsaved(err))
            }
        }
    }

    async fn invoke<Fut>(&self, node_id: &str, operation: Operation, body: Fut) -> ActionResult
    where
        Fut: Future<Output = Result<String, ExecutorError>>,
    {
        match self.begin(node_id).await {
            Begin::Closed => return ActionResult::error(ExecutorError::Closed.to_string()),
            Begin::Busy => {
                return self
                    .publish(Some(node_id), operation, ActionResult::pending(busy(node_id)))
                    .await
            }
            Begin::Started => {}
        }
        let outcome = body.await;
        self.report(Some(node_id), operation, outcome).await
    }

    async fn begin(&self, node_id: &str) -> Begin {
        let mut state = self.state.write().await;
        if state.closed {
            return Begin::Closed;
        }
        if state.is_invoking(node_id) {
            return Begin::Busy;
        }
        state
            .invocations
            .insert(node_id.to_string(), InvocationState::Invoking);
        Begin::Started
    }

    /// Turn an outcome into a published result and settle the node's invocation state.
    async fn report(
        &self,
        node_id: Option<&str>,
        operation: Operation,
        outcome: Result<String, ExecutorError>,
    ) -> ActionResult {
        let result = match outcome {
            Ok(message) => {
                info!(node_id, operation = operation.as_str(), %message, "action succeeded");
                ActionResult::success(message)
            }
            Err(ExecutorError::Closed) => {
                debug!(node_id, operation = operation.as_str(), "late result discarded");
                return ActionResult::error(ExecutorError::Closed.to_string());
            }
            Err(err) => {
                let message = err.to_string();
                let app_error = AppError::from(err);
                warn!(
                    node_id,
                    operation = operation.as_str(),
                    code = %app_error.code,
                    "action failed: {}",
                    message
                );
                ActionResult::error(message)
            }
        };

        if let Some(node_id) = node_id {
            let mut state = self.state.write().await;
            if state.closed {
                return result;
            }
            if state.is_invoking(node_id) {
                let settled = match result.status {
                    ActionStatus::Success => InvocationState::Success,
                    _ => InvocationState::Error,
                };
                state.invocations.insert(node_id.to_string(), settled);
            }
        } else if self.is_closed().await {
            return result;
        }
        self.publish(node_id, operation, result).await
    }

    async fn publish(
        &self,
        node_id: Option<&str>,
        operation: Operation,
        result: ActionResult,
    ) -> ActionResult {
        // No subscribers is not an error.
        let _ = self.events.send(EngineEvent::ActionReported {
            node_id: node_id.map(str::to_string),
            operation,
            result: result.clone(),
        });
        result
    }

    fn notify_commit(&self, revision: u64) {
        let _ = self.events.send(EngineEvent::GraphCommitted { revision });
    }
}

fn busy(node_id: &str) -> String {
    format!("{} is still being processed", node_id)
}

fn target_flow(node: &Node) -> String {
    match &node.kind {
        NodeKind::End(data) => data.to_flow_id.clone().unwrap_or_default(),
        _ => String::new(),
    }
}
