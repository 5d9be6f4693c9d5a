//! Integration tests for the HTTP API
//!
//! Routes are driven in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use sentinel::api::{create_router, ApiState};
use sentinel::gateway::GatewayError;
use sentinel::triage::SessionArchive;
use sentinel::{IncidentHistory, MemoryGateway, RuleClassifier, TriageConfig, TriageController, ValidatingClassifier};

fn app_with(gateway: MemoryGateway, archive: Option<SessionArchive>) -> Router {
    let controller = TriageController::new(
        Arc::new(gateway),
        Arc::new(ValidatingClassifier::new(RuleClassifier::default())),
        Arc::new(IncidentHistory::new()),
        TriageConfig::default(),
    );
    create_router(ApiState {
        controller: Arc::new(controller),
        archive,
    })
}

fn app() -> Router {
    app_with(
        MemoryGateway::new()
            .with_target("worker-node", "Error: Java heap space. java.lang.OutOfMemoryError.")
            .with_target("frontend-ui", "INFO: Rendered page in 20ms.\nINFO: Cache hit.")
            .with_target("stuck", "ERROR: boom")
            .with_fetch_error("stuck", GatewayError::Unavailable("daemon down".into())),
        None,
    )
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_analyze_returns_decision() {
    let app = app();
    let (status, body) = send(&app, "POST", "/analyze", Some(json!({"target_id": "worker-node"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target_id"], "worker-node");
    assert_eq!(body["diagnosis"]["root_cause"], "OOM");
    assert_eq!(body["diagnosis"]["severity"], "critical");
    assert_eq!(body["decision"]["action"], "restart");
    assert_eq!(body["decision"]["reason"], "classifier recommended restart");
    assert_eq!(body["outcome"]["status"], "restarted");
}

#[tokio::test]
async fn test_analyze_error_statuses() {
    let app = app();

    let (status, body) = send(&app, "POST", "/analyze", Some(json!({"target_id": "ghost"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "TargetNotFound");

    let (status, body) = send(&app, "POST", "/analyze", Some(json!({"target_id": "stuck"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "GatewayUnavailable");

    let (status, _) = send(&app, "POST", "/analyze", Some(json!({"target_id": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_incident_history_and_reset() {
    let app = app();
    send(&app, "POST", "/analyze", Some(json!({"target_id": "worker-node"}))).await;
    send(&app, "POST", "/analyze", Some(json!({"target_id": "frontend-ui"}))).await;
    send(&app, "POST", "/analyze", Some(json!({"target_id": "ghost"}))).await;

    let (_, all) = send(&app, "GET", "/api/incidents", None).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, ghost) = send(&app, "GET", "/api/incidents?target_id=ghost", None).await;
    assert_eq!(ghost.as_array().unwrap().len(), 1);
    assert_eq!(ghost[0]["decision"]["reason"], "TargetNotFound");
    assert!(ghost[0]["diagnosis"].is_null());

    let (_, session) = send(&app, "GET", "/api/session", None).await;
    let session_id = session["id"].clone();
    assert_eq!(session["records"].as_array().unwrap().len(), 3);

    let (status, reset) = send(&app, "POST", "/api/session/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["ended"]["id"], session_id);
    assert_eq!(reset["ended"]["records"], 3);
    assert_eq!(reset["archived"], false);
    assert_ne!(reset["session_id"], session_id);

    let (_, all) = send(&app, "GET", "/api/incidents", None).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_reset_archives_session() {
    let dir = std::env::temp_dir().join(format!("sentinel-api-{}", uuid::Uuid::now_v7()));
    let archive = SessionArchive::new(&dir).unwrap();
    let app = app_with(MemoryGateway::new().with_target("frontend-ui", "INFO: ok"), Some(archive));

    send(&app, "POST", "/analyze", Some(json!({"target_id": "frontend-ui"}))).await;
    let (_, reset) = send(&app, "POST", "/api/session/reset", None).await;
    assert_eq!(reset["archived"], true);

    let (_, sessions) = send(&app, "GET", "/api/sessions", None).await;
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], reset["ended"]["id"]);

    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    send(&app, "POST", "/analyze", Some(json!({"target_id": "frontend-ui"}))).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sentinel_triage_cycles_total"));
    assert!(text.contains("sentinel_decisions_total"));
}
