//! Gateway client for a remote `OpsService`
//!
//! Lets the triage controller run on a different host than the container
//! runtime: the ops server owns the Docker socket and this client calls it.

use std::time::Instant;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

use super::{dedup_targets, observe_call, GatewayError, Target, TargetStatus, ToolGateway};
use crate::grpc::ops::ops_service_client::OpsServiceClient;
use crate::grpc::ops::{GetContainerLogsRequest, ListContainersRequest, RestartServiceRequest};

/// [`ToolGateway`] that forwards every call to an `OpsService`
#[derive(Clone)]
pub struct RpcGateway {
    client: OpsServiceClient<Channel>,
}

impl RpcGateway {
    /// Create a client for `endpoint` (e.g. `http://127.0.0.1:50061`).
    ///
    /// The channel connects lazily, so an unreachable server surfaces as
    /// `GatewayUnavailable` on the first call instead of here.
    pub fn connect_lazy(endpoint: impl Into<String>) -> Result<Self, GatewayError> {
        let endpoint = endpoint.into();
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| GatewayError::Unavailable(format!("invalid ops endpoint '{}': {}", endpoint, e)))?
            .connect_lazy();

        Ok(Self {
            client: OpsServiceClient::new(channel),
        })
    }
}

fn gateway_error_from_status(status: Status, target: Option<&str>) -> GatewayError {
    match status.code() {
        Code::NotFound => GatewayError::TargetNotFound(target.unwrap_or_default().to_string()),
        Code::DeadlineExceeded => GatewayError::Timeout(format!("on ops server: {}", status.message())),
        _ => GatewayError::Unavailable(format!("ops server error ({:?}): {}", status.code(), status.message())),
    }
}

#[async_trait]
impl ToolGateway for RpcGateway {
    async fn list_targets(&self) -> Result<Vec<Target>, GatewayError> {
        let start = Instant::now();
        let mut client = self.client.clone();

        let result = client
            .list_active_containers(ListContainersRequest {})
            .await
            .map(|response| {
                dedup_targets(
                    response
                        .into_inner()
                        .containers
                        .into_iter()
                        .map(|c| Target::new(c.name, TargetStatus::parse(&c.status)))
                        .collect(),
                )
            })
            .map_err(|status| gateway_error_from_status(status, None));

        observe_call("rpc_list", start, &result);
        result
    }

    async fn fetch_logs(&self, target_id: &str, tail_lines: usize) -> Result<String, GatewayError> {
        let start = Instant::now();
        let mut client = self.client.clone();

        let result = client
            .get_container_logs(GetContainerLogsRequest {
                name: target_id.to_string(),
                tail: u32::try_from(tail_lines).unwrap_or(u32::MAX),
            })
            .await
            .map(|response| response.into_inner().logs)
            .map_err(|status| gateway_error_from_status(status, Some(target_id)));

        observe_call("rpc_logs", start, &result);
        result
    }

    async fn restart(&self, target_id: &str) -> Result<bool, GatewayError> {
        let start = Instant::now();
        let mut client = self.client.clone();

        let result = client
            .restart_service(RestartServiceRequest {
                name: target_id.to_string(),
            })
            .await
            .map(|response| response.into_inner().restarted)
            .map_err(|status| gateway_error_from_status(status, Some(target_id)));

        observe_call("rpc_restart", start, &result);
        result
    }
}
