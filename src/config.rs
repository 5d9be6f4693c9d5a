//! Configuration
//!
//! Settings come from an optional TOML file; every field has a default so an
//! empty (or missing) file is a valid configuration. Command-line flags are
//! applied on top by the binaries.
//!
//! ```toml
//! [policy]
//! confidence_threshold = 0.7
//! max_retries = 1
//! escalate_severity_floor = "high"
//!
//! [triage]
//! max_log_lines = 200
//! fetch_timeout_seconds = 10
//!
//! [gateway]
//! kind = "docker"
//!
//! [classifier]
//! kind = "llm"
//! model = "llama3.2"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{ClassificationError, Classifier, LlmClassifier, RuleClassifier, ValidatingClassifier};
use crate::gateway::docker::DEFAULT_DOCKER_SOCKET;
use crate::gateway::{DockerGateway, GatewayError, RpcGateway, ToolGateway};
use crate::ollama::ChatClient;
use crate::policy::PolicyConfig;
use crate::triage::TriageConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentinelConfig {
    pub policy: PolicyConfig,
    pub triage: TriageSettings,
    pub gateway: GatewaySettings,
    pub classifier: ClassifierSettings,
    pub server: ServerSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriageSettings {
    pub max_log_lines: usize,
    pub fetch_timeout_seconds: u64,
    pub restart_timeout_seconds: u64,
    pub classify_timeout_seconds: u64,
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            max_log_lines: 200,
            fetch_timeout_seconds: 10,
            restart_timeout_seconds: 30,
            classify_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// Docker Engine API over its Unix socket
    Docker,
    /// Remote ops server over gRPC
    Rpc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySettings {
    pub kind: GatewayKind,
    pub docker_socket: PathBuf,
    pub rpc_endpoint: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Docker,
            docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
            rpc_endpoint: "http://127.0.0.1:50061".to_string(),
        }
    }
}

impl GatewaySettings {
    /// Build the configured gateway
    pub fn build(&self) -> Result<Arc<dyn ToolGateway>, GatewayError> {
        Ok(match self.kind {
            GatewayKind::Docker => Arc::new(DockerGateway::new(self.docker_socket.to_string_lossy())),
            GatewayKind::Rpc => Arc::new(RpcGateway::connect_lazy(self.rpc_endpoint.clone())?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Built-in signature table
    Rules,
    /// Few-shot chat model
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSettings {
    pub kind: ClassifierKind,
    pub ollama_url: String,
    pub model: String,
    /// Compiled few-shot demo file; built-in demos are used when unset or missing
    pub demos_path: Option<PathBuf>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Rules,
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            demos_path: None,
        }
    }
}

impl ClassifierSettings {
    /// Build the configured classifier, wrapped in output validation.
    ///
    /// `request_timeout` bounds each chat request of the LLM classifier.
    pub fn build(&self, request_timeout: Duration) -> Result<Arc<dyn Classifier>, ClassificationError> {
        Ok(match self.kind {
            ClassifierKind::Rules => Arc::new(ValidatingClassifier::new(RuleClassifier::default())),
            ClassifierKind::Llm => {
                let client = ChatClient::with_timeout(self.ollama_url.clone(), request_timeout)
                    .map_err(|e| ClassificationError::Backend(e.to_string()))?;
                let classifier = LlmClassifier::from_demo_file(client, self.model.clone(), self.demos_path.as_deref())?;
                Arc::new(ValidatingClassifier::new(classifier))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub http_addr: SocketAddr,
    pub ops_addr: SocketAddr,
    /// Where ended sessions are archived; archiving is off when unset
    pub session_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            ops_addr: SocketAddr::from(([0, 0, 0, 0], 50061)),
            session_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySettings {
    pub otlp_endpoint: Option<String>,
    pub log_filter: String,
    pub json_logs: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_filter: crate::tracing::DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}

impl SentinelConfig {
    /// Load from `path`, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.policy.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(invalid("policy.confidence_threshold", format!("{} is not in [0, 1]", threshold)));
        }
        if self.triage.max_log_lines == 0 {
            return Err(invalid("triage.max_log_lines", "must be greater than zero"));
        }
        for (field, value) in [
            ("triage.fetch_timeout_seconds", self.triage.fetch_timeout_seconds),
            ("triage.restart_timeout_seconds", self.triage.restart_timeout_seconds),
            ("triage.classify_timeout_seconds", self.triage.classify_timeout_seconds),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.gateway.kind == GatewayKind::Rpc && self.gateway.rpc_endpoint.trim().is_empty() {
            return Err(invalid("gateway.rpc_endpoint", "required when gateway.kind = \"rpc\""));
        }
        if self.classifier.kind == ClassifierKind::Llm && self.classifier.model.trim().is_empty() {
            return Err(invalid("classifier.model", "required when classifier.kind = \"llm\""));
        }
        Ok(())
    }

    pub fn triage_config(&self) -> TriageConfig {
        TriageConfig {
            max_log_lines: self.triage.max_log_lines,
            fetch_timeout: Duration::from_secs(self.triage.fetch_timeout_seconds),
            restart_timeout: Duration::from_secs(self.triage.restart_timeout_seconds),
            classify_timeout: Duration::from_secs(self.triage.classify_timeout_seconds),
            policy: self.policy.clone(),
        }
    }
}
