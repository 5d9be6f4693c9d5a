use std::sync::Arc;
use std::time::{Duration, Instant};

use tonic::{Request, Response, Status};
use tracing::{info, warn, Instrument, Span};

use crate::gateway::{with_timeout, GatewayError, ToolGateway};
use crate::metrics::GRPC_REQUEST_DURATION;

use super::ops::ops_service_server::OpsService;
use super::ops::{
    ContainerInfo, GetContainerLogsRequest, GetContainerLogsResponse, ListContainersRequest,
    ListContainersResponse, RestartServiceRequest, RestartServiceResponse,
};

/// Default tail used when a caller sends `tail = 0`
const DEFAULT_TAIL: usize = 50;

/// Serves container operations from any [`ToolGateway`]
pub struct OpsServer {
    gateway: Arc<dyn ToolGateway>,
    /// Upper bound for read operations; restarts are never cut short
    read_timeout: Duration,
}

impl OpsServer {
    pub fn new(gateway: Arc<dyn ToolGateway>, read_timeout: Duration) -> Self {
        Self { gateway, read_timeout }
    }
}

/// Map gateway failures onto gRPC status codes that `RpcGateway` maps back
pub fn status_from_gateway(err: GatewayError) -> Status {
    match err {
        GatewayError::TargetNotFound(name) => Status::not_found(format!("container '{}' not found", name)),
        GatewayError::Timeout(detail) => Status::deadline_exceeded(format!("gateway call timed out {}", detail)),
        GatewayError::Unavailable(msg) => Status::unavailable(msg),
    }
}

#[tonic::async_trait]
impl OpsService for OpsServer {
    async fn list_active_containers(
        &self,
        _request: Request<ListContainersRequest>,
    ) -> Result<Response<ListContainersResponse>, Status> {
        let start = Instant::now();

        let result = with_timeout("list_active_containers", self.read_timeout, self.gateway.list_targets()).await;
        GRPC_REQUEST_DURATION
            .with_label_values(&["list_active_containers"])
            .observe(start.elapsed().as_secs_f64());

        let targets = result.map_err(status_from_gateway)?;
        Ok(Response::new(ListContainersResponse {
            containers: targets
                .into_iter()
                .map(|t| ContainerInfo {
                    name: t.id,
                    status: t.status.as_str().to_string(),
                })
                .collect(),
        }))
    }

    async fn get_container_logs(
        &self,
        request: Request<GetContainerLogsRequest>,
    ) -> Result<Response<GetContainerLogsResponse>, Status> {
        let start = Instant::now();

        let req = request.into_inner();
        if req.name.is_empty() {
            return Err(Status::invalid_argument("container name is required"));
        }
        let tail = if req.tail == 0 { DEFAULT_TAIL } else { req.tail as usize };

        let result = with_timeout(
            "get_container_logs",
            self.read_timeout,
            self.gateway.fetch_logs(&req.name, tail),
        )
        .await;
        GRPC_REQUEST_DURATION
            .with_label_values(&["get_container_logs"])
            .observe(start.elapsed().as_secs_f64());

        let logs = result.map_err(status_from_gateway)?;
        Ok(Response::new(GetContainerLogsResponse { logs }))
    }

    async fn restart_service(
        &self,
        request: Request<RestartServiceRequest>,
    ) -> Result<Response<RestartServiceResponse>, Status> {
        let start = Instant::now();

        let req = request.into_inner();
        if req.name.is_empty() {
            return Err(Status::invalid_argument("container name is required"));
        }

        info!(container = %req.name, "Restart requested over RPC");
        // An issued restart outlives the RPC that asked for it
        let gateway = Arc::clone(&self.gateway);
        let name = req.name.clone();
        let task = tokio::spawn(async move { gateway.restart(&name).await }.instrument(Span::current()));
        let result = task
            .await
            .unwrap_or_else(|e| Err(GatewayError::Unavailable(format!("restart task failed: {}", e))));
        GRPC_REQUEST_DURATION
            .with_label_values(&["restart_service"])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(restarted) => {
                if !restarted {
                    warn!(container = %req.name, "Restart reported failure");
                }
                Ok(Response::new(RestartServiceResponse { restarted }))
            }
            Err(e) => Err(status_from_gateway(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn server() -> OpsServer {
        let gateway = MemoryGateway::new()
            .with_target("chaos-monkey", "FATAL: boom")
            .with_target("frontend-ui", "INFO: Cache hit.");
        OpsServer::new(Arc::new(gateway), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_list_active_containers() {
        let response = server()
            .list_active_containers(Request::new(ListContainersRequest {}))
            .await
            .unwrap()
            .into_inner();
        let names: Vec<_> = response.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["chaos-monkey", "frontend-ui"]);
        assert_eq!(response.containers[0].status, "running");
    }

    #[tokio::test]
    async fn test_get_container_logs_not_found() {
        let status = server()
            .get_container_logs(Request::new(GetContainerLogsRequest {
                name: "ghost".into(),
                tail: 10,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_restart_service() {
        let response = server()
            .restart_service(Request::new(RestartServiceRequest {
                name: "chaos-monkey".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.restarted);
    }

    #[tokio::test]
    async fn test_restart_survives_dropped_request() {
        let gateway = Arc::new(
            MemoryGateway::new()
                .with_target("chaos-monkey", "FATAL: boom")
                .with_restart_delay("chaos-monkey", Duration::from_millis(200)),
        );
        let server = OpsServer::new(gateway.clone(), Duration::from_secs(1));

        let call = server.restart_service(Request::new(RestartServiceRequest {
            name: "chaos-monkey".into(),
        }));
        assert!(tokio::time::timeout(Duration::from_millis(20), call).await.is_err());
        assert_eq!(gateway.restart_calls("chaos-monkey"), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(gateway.restarts_completed("chaos-monkey"), 1);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_from_gateway(GatewayError::Timeout("after 2s".into())).code(),
            tonic::Code::DeadlineExceeded
        );
        assert_eq!(
            status_from_gateway(GatewayError::Unavailable("down".into())).code(),
            tonic::Code::Unavailable
        );
    }
}
