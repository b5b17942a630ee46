use chrono::Utc;
use docflow::core::workflow_graph::gateway::{
    GatewayError, GraphUpdate, HttpPersistenceGateway, IntegrationRequest, PersistenceGateway,
    TransferRequest,
};
use docflow::core::workflow_graph::graph::{GraphSnapshot, Node, NodeKind, StartData};
use docflow_types::{DocumentStatus, IntegrationConfig};
use reqwest::Url;
use serde_json::{json, Map};
use std::net::TcpListener;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> HttpPersistenceGateway {
    let base = Url::parse(&format!("{}/api", server.uri())).unwrap();
    HttpPersistenceGateway::new(base, Duration::from_secs(5))
        .unwrap()
        .with_auth_token("secret-token")
}

fn snapshot() -> GraphSnapshot {
    GraphSnapshot {
        nodes: vec![Node::new(
            "start",
            NodeKind::Start(StartData {
                is_executed: true,
                is_pending_connected: false,
            }),
        )],
        edges: Vec::new(),
        viewport: Default::default(),
    }
}

#[tokio::test]
async fn update_graph_puts_snapshot_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/flows/flow-1/tasks"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(json!({
            "nodes": [{"id": "start", "type": "startNode", "data": {"isExecuted": true}}],
            "edges": [],
            "viewport": {"x": 0.0, "y": 0.0, "zoom": 1.0}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .update_graph("flow-1", &GraphUpdate::in_progress(snapshot()))
        .await
        .unwrap();
}

#[tokio::test]
async fn concluded_update_carries_status_and_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/flows/flow-1/tasks"))
        .and(body_partial_json(json!({"status": "done"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let update = GraphUpdate::concluded(snapshot(), Utc::now());
    gateway(&server).update_graph("flow-1", &update).await.unwrap();
}

#[tokio::test]
async fn transfer_returns_target_flow_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/flows/transfer"))
        .and(body_partial_json(json!({
            "currentDocumentId": "doc-1",
            "targetFlowId": "flow-B",
            "flowTasks": {"edges": []}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"targetFlowName": "Legal review"})),
        )
        .mount(&server)
        .await;

    let response = gateway(&server)
        .transfer_flow(&TransferRequest {
            current_document_id: "doc-1".into(),
            target_flow_id: "flow-B".into(),
            flow_tasks: snapshot(),
        })
        .await
        .unwrap();
    assert_eq!(response.target_flow_name, "Legal review");
}

#[tokio::test]
async fn integration_fetch_and_execute() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/integrations/crm-42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "CRM", "board": 7})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/integrations/crm-42/execute"))
        .and(body_json(json!({
            "documentId": "doc-1",
            "flowId": "flow-1",
            "nodeId": "crm",
            "config": {"name": "CRM", "board": 7}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "synced"})))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let config = gateway.fetch_integration("crm-42").await.unwrap();
    assert_eq!(config.settings.get("board"), Some(&json!(7)));

    let response = gateway
        .invoke_integration(
            "crm-42",
            &IntegrationRequest {
                document_id: "doc-1".into(),
                flow_id: "flow-1".into(),
                node_id: "crm".into(),
                config,
            },
        )
        .await
        .unwrap();
    assert_eq!(response.message.as_deref(), Some("synced"));
}

#[tokio::test]
async fn empty_integration_response_has_no_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/integrations/crm-42/execute"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let response = gateway(&server)
        .invoke_integration(
            "crm-42",
            &IntegrationRequest {
                document_id: "doc-1".into(),
                flow_id: "flow-1".into(),
                node_id: "crm".into(),
                config: IntegrationConfig {
                    name: "CRM".into(),
                    settings: Map::new(),
                },
            },
        )
        .await
        .unwrap();
    assert!(response.message.is_none());
}

#[tokio::test]
async fn document_status_is_put_as_snake_case() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/documents/doc-1/status"))
        .and(body_json(json!({"status": "concluded"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .update_document_status("doc-1", DocumentStatus::Concluded)
        .await
        .unwrap();
}

#[tokio::test]
async fn non_success_status_becomes_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/flows/flow-1/tasks"))
        .respond_with(ResponseTemplate::new(409).set_body_string("stale"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .update_graph("flow-1", &GraphUpdate::in_progress(snapshot()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::Server {
            status: 409,
            body: "stale".into()
        }
    );
}

#[tokio::test]
async fn undecodable_body_becomes_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/integrations/crm-42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = gateway(&server).fetch_integration("crm-42").await.unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn refused_connection_becomes_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = Url::parse(&format!("http://{}/api", addr)).unwrap();
    let gateway = HttpPersistenceGateway::new(base, Duration::from_secs(5)).unwrap();
    let err = gateway
        .update_document_status("doc-1", DocumentStatus::Concluded)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Network(_)), "got {:?}", err);
}
