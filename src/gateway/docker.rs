//! Docker Engine API gateway
//!
//! Talks to the Docker daemon over its Unix domain socket, the same way the
//! CLI does, using the REST endpoints:
//!
//! ```text
//! GET  /containers/json                              list running containers
//! GET  /containers/{name}/logs?stdout&stderr&tail=N  recent log lines
//! POST /containers/{name}/restart                    restart a container
//! ```

use std::time::Instant;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, StatusCode};
use hyper_util::client::legacy::Client;
use hyperlocal::UnixConnector;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{dedup_targets, observe_call, GatewayError, Target, TargetStatus, ToolGateway};

/// Default location of the Docker daemon socket
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

type HyperClient = Client<UnixConnector, Full<Bytes>>;

/// Subset of the `/containers/json` response we care about
#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "State", default)]
    state: String,
}

impl ContainerSummary {
    /// Docker reports names with a leading slash ("/web"); fall back to the short id
    fn into_target(self) -> Target {
        let id = self
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.id.chars().take(12).collect());
        Target::new(id, TargetStatus::parse(&self.state))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Gateway backed by a local Docker daemon
pub struct DockerGateway {
    client: HyperClient,
    socket_path: String,
}

impl DockerGateway {
    /// Create a gateway for the daemon listening on `socket_path`
    pub fn new(socket_path: impl Into<String>) -> Self {
        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build(UnixConnector);

        Self {
            client,
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Send a request to the Engine API and collect the full response body
    async fn send_request(&self, method: Method, endpoint: &str) -> Result<(StatusCode, Bytes), GatewayError> {
        let uri: hyper::Uri = hyperlocal::Uri::new(&self.socket_path, endpoint).into();

        let req = hyper::Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", "docker")
            .body(Full::new(Bytes::new()))
            .map_err(|e| GatewayError::Unavailable(format!("invalid request for {}: {}", endpoint, e)))?;

        let res = self.client.request(req).await.map_err(|e| {
            GatewayError::Unavailable(format!("docker daemon at {} unreachable: {}", self.socket_path, e))
        })?;

        let status = res.status();
        let body = res
            .into_body()
            .collect()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("failed to read docker response: {}", e)))?
            .to_bytes();

        Ok((status, body))
    }

    async fn list(&self) -> Result<Vec<Target>, GatewayError> {
        let (status, body) = self.send_request(Method::GET, "/containers/json").await?;
        if !status.is_success() {
            return Err(GatewayError::Unavailable(format!(
                "container list failed: {} - {}",
                status,
                error_message(&body)
            )));
        }

        let summaries: Vec<ContainerSummary> = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::Unavailable(format!("unexpected container list payload: {}", e)))?;

        Ok(dedup_targets(
            summaries.into_iter().map(ContainerSummary::into_target).collect(),
        ))
    }

    async fn logs(&self, target_id: &str, tail_lines: usize) -> Result<String, GatewayError> {
        validate_name(target_id)?;
        let endpoint = format!(
            "/containers/{}/logs?stdout=true&stderr=true&tail={}",
            target_id, tail_lines
        );
        let (status, body) = self.send_request(Method::GET, &endpoint).await?;

        match status {
            s if s.is_success() => Ok(demux_log_stream(&body)),
            StatusCode::NOT_FOUND => Err(GatewayError::TargetNotFound(target_id.to_string())),
            s => Err(GatewayError::Unavailable(format!(
                "log fetch for {} failed: {} - {}",
                target_id,
                s,
                error_message(&body)
            ))),
        }
    }

    async fn restart_container(&self, target_id: &str) -> Result<bool, GatewayError> {
        validate_name(target_id)?;
        let endpoint = format!("/containers/{}/restart", target_id);
        let (status, body) = self.send_request(Method::POST, &endpoint).await?;

        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Err(GatewayError::TargetNotFound(target_id.to_string())),
            s => {
                warn!(target = target_id, status = %s, error = %error_message(&body), "Restart rejected by daemon");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl ToolGateway for DockerGateway {
    async fn list_targets(&self) -> Result<Vec<Target>, GatewayError> {
        let start = Instant::now();
        let result = self.list().await;
        observe_call("docker_list", start, &result);
        result
    }

    async fn fetch_logs(&self, target_id: &str, tail_lines: usize) -> Result<String, GatewayError> {
        let start = Instant::now();
        let result = self.logs(target_id, tail_lines).await;
        if let Ok(ref logs) = result {
            debug!(target = target_id, bytes = logs.len(), "Fetched container logs");
        }
        observe_call("docker_logs", start, &result);
        result
    }

    async fn restart(&self, target_id: &str) -> Result<bool, GatewayError> {
        let start = Instant::now();
        let result = self.restart_container(target_id).await;
        observe_call("docker_restart", start, &result);
        result
    }
}

/// Container names are `[a-zA-Z0-9][a-zA-Z0-9_.-]*`; anything else cannot exist
/// and must not be spliced into a request path.
fn validate_name(name: &str) -> Result<(), GatewayError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(GatewayError::TargetNotFound(name.to_string()))
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

/// Strip Docker's stdout/stderr multiplexing from a log payload.
///
/// Containers without a TTY stream logs as frames with an 8-byte header:
/// `[stream, 0, 0, 0, size(u32 BE)]` followed by `size` bytes of payload.
/// TTY containers send raw bytes, which are passed through unchanged.
pub fn demux_log_stream(raw: &[u8]) -> String {
    if !looks_multiplexed(raw) {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    while rest.len() >= 8 {
        let size = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = 8usize.saturating_add(size).min(rest.len());
        out.extend_from_slice(&rest[8..end]);
        rest = &rest[end..];
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn looks_multiplexed(raw: &[u8]) -> bool {
    raw.len() >= 8 && matches!(raw[0], 0..=2) && raw[1..4] == [0, 0, 0]
}
