//! Tool Gateway - uniform access to container operations
//!
//! The triage pipeline only ever talks to targets through the [`ToolGateway`]
//! trait, so the transport behind it can be swapped freely:
//!
//! - [`DockerGateway`] - Docker Engine API over its Unix socket
//! - [`RpcGateway`] - the `OpsService` gRPC tool server
//! - [`MemoryGateway`] - scripted in-memory targets for tests and dry runs
//!
//! # Retry Safety
//!
//! ```text
//! list_targets  read   safe to retry
//! fetch_logs    read   safe to retry
//! restart       write  NOT safe to retry (capped per session by the controller)
//! ```

pub mod docker;
pub mod memory;
pub mod rpc;

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{GATEWAY_CALLS, GATEWAY_CALL_DURATION};

pub use docker::DockerGateway;
pub use memory::MemoryGateway;
pub use rpc::RpcGateway;

/// Runtime status of a target as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Running,
    Restarting,
    Unknown,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Running => "running",
            TargetStatus::Restarting => "restarting",
            TargetStatus::Unknown => "unknown",
        }
    }

    /// Lenient parse used for runtime-reported states ("exited", "paused", ... map to Unknown)
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => TargetStatus::Running,
            "restarting" => TargetStatus::Restarting,
            _ => TargetStatus::Unknown,
        }
    }
}

/// A named remediation unit, e.g. a running container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub status: TargetStatus,
}

impl Target {
    pub fn new(id: impl Into<String>, status: TargetStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }
}

/// Failures surfaced by gateway implementations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The runtime could not be reached; needs a connectivity fix
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// The call did not finish within the caller's timeout; retryable after backoff
    #[error("gateway call timed out {0}")]
    Timeout(String),
    /// The target no longer exists
    #[error("target not found: {0}")]
    TargetNotFound(String),
}

impl GatewayError {
    /// Stable taxonomy name recorded in incident records
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unavailable(_) => "GatewayUnavailable",
            GatewayError::Timeout(_) => "GatewayTimeout",
            GatewayError::TargetNotFound(_) => "TargetNotFound",
        }
    }
}

/// Uniform interface to the external actions the pipeline can take
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Enumerate targets, unique by id. May be empty.
    async fn list_targets(&self) -> Result<Vec<Target>, GatewayError>;

    /// Fetch the last `tail_lines` lines of a target's logs
    async fn fetch_logs(&self, target_id: &str, tail_lines: usize) -> Result<String, GatewayError>;

    /// Restart a target. Returns whether the runtime reported success.
    async fn restart(&self, target_id: &str) -> Result<bool, GatewayError>;
}

/// Sort and de-duplicate targets by id
pub(crate) fn dedup_targets(mut targets: Vec<Target>) -> Vec<Target> {
    targets.sort_by(|a, b| a.id.cmp(&b.id));
    targets.dedup_by(|a, b| a.id == b.id);
    targets
}

/// Run a gateway call under a timeout, recording call metrics.
///
/// The future is dropped (cancelled) when the timeout fires, so this must not
/// be used for calls that are unsafe to abandon mid-flight.
pub async fn with_timeout<T, F>(op: &'static str, timeout: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(format!("after {:?}", timeout))),
    };
    observe_call(op, start, &result);
    result
}

pub(crate) fn observe_call<T>(op: &str, start: Instant, result: &Result<T, GatewayError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    GATEWAY_CALLS.with_label_values(&[op, status]).inc();
    GATEWAY_CALL_DURATION
        .with_label_values(&[op])
        .observe(start.elapsed().as_secs_f64());
}
