//! Integration tests for the OpsService round trip
//!
//! An `OpsServer` is served over tonic on a local port and driven through
//! `RpcGateway`, the same path the controller and `sentinel-ops` use.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::TcpListenerStream;

use sentinel::gateway::{GatewayError, RpcGateway, TargetStatus};
use sentinel::grpc::ops::ops_service_server::OpsServiceServer;
use sentinel::grpc::OpsServer;
use sentinel::{IncidentHistory, MemoryGateway, RuleClassifier, ToolGateway, TriageConfig, TriageController};

const OOM_LOGS: &str = "Starting worker\nError: Java heap space. java.lang.OutOfMemoryError. Terminating process.";

/// Serve `backend` on an ephemeral port and return its address
async fn serve(backend: Arc<MemoryGateway>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = OpsServer::new(backend, Duration::from_secs(1));

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(OpsServiceServer::new(server))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

fn client(addr: SocketAddr) -> RpcGateway {
    RpcGateway::connect_lazy(format!("http://{}", addr)).unwrap()
}

#[tokio::test]
async fn test_tools_round_trip() {
    let backend = Arc::new(
        MemoryGateway::new()
            .with_target("worker-node", "line 1\nline 2\nline 3")
            .with_target("frontend-ui", "INFO: Cache hit.")
            .with_restart_result("frontend-ui", Ok(false)),
    );
    let gateway = client(serve(Arc::clone(&backend)).await);

    let targets = gateway.list_targets().await.unwrap();
    let ids: Vec<_> = targets.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["frontend-ui", "worker-node"]);
    assert!(targets.iter().all(|t| t.status == TargetStatus::Running));

    assert_eq!(gateway.fetch_logs("worker-node", 2).await.unwrap(), "line 2\nline 3");

    assert_eq!(gateway.restart("worker-node").await, Ok(true));
    assert_eq!(gateway.restart("frontend-ui").await, Ok(false));
    assert_eq!(backend.restart_calls("worker-node"), 1);
}

#[tokio::test]
async fn test_errors_keep_their_kind_across_the_wire() {
    let backend = Arc::new(
        MemoryGateway::new()
            .with_target("stuck", "ERROR")
            .with_fetch_error("stuck", GatewayError::Unavailable("daemon down".into()))
            .with_target("slow", "ERROR")
            .with_fetch_delay("slow", Duration::from_secs(5)),
    );
    let gateway = client(serve(backend).await);

    assert_eq!(
        gateway.fetch_logs("ghost", 10).await,
        Err(GatewayError::TargetNotFound("ghost".into()))
    );
    assert_eq!(gateway.restart("ghost").await.unwrap_err().kind(), "TargetNotFound");
    assert_eq!(gateway.fetch_logs("stuck", 10).await.unwrap_err().kind(), "GatewayUnavailable");
    // The server's read timeout comes back as a deadline, not as unavailability
    assert_eq!(gateway.fetch_logs("slow", 10).await.unwrap_err().kind(), "GatewayTimeout");
}

#[tokio::test]
async fn test_triage_over_rpc() {
    let backend = Arc::new(MemoryGateway::new().with_target("worker-node", OOM_LOGS));
    let gateway = client(serve(Arc::clone(&backend)).await);

    let controller = TriageController::new(
        Arc::new(gateway),
        Arc::new(RuleClassifier::default()),
        Arc::new(IncidentHistory::new()),
        TriageConfig::default(),
    );

    let entries = controller.sweep().await.unwrap();
    assert_eq!(entries.len(), 1);
    let report = entries[0].1.as_ref().unwrap();
    assert_eq!(report.decision.reason, "classifier recommended restart");
    assert_eq!(backend.restarts_completed("worker-node"), 1);
}
