//! Sentinel - incident triage for containerized services
//!
//! Turns raw container logs into a bounded, typed remediation decision and
//! acts on it through a small set of tools (list, fetch logs, restart).
//!
//! # Modules
//!
//! - `normalizer` - raw log text to a bounded `LogWindow`
//! - `gateway` - list/fetch/restart over Docker, gRPC, or in-memory targets
//! - `grpc` - `OpsService` tool server exposing a gateway over gRPC
//! - `classifier` - rule-table and few-shot LLM diagnosis
//! - `ollama` - chat client used by the LLM classifier
//! - `policy` - pure decision state machine
//! - `triage` - triage cycles, session history, escalations
//! - `api` - HTTP endpoint over the triage controller
//! - `config` - TOML configuration
//! - `metrics` - Prometheus metrics
//! - `tracing` - logging and optional OTLP export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sentinel::{IncidentHistory, MemoryGateway, RuleClassifier, TriageConfig, TriageController};
//!
//! let gateway = MemoryGateway::new().with_target("worker", "java.lang.OutOfMemoryError");
//! let controller = TriageController::new(
//!     Arc::new(gateway),
//!     Arc::new(RuleClassifier::default()),
//!     Arc::new(IncidentHistory::new()),
//!     TriageConfig::default(),
//! );
//! let report = controller.triage("worker").await?;
//! ```

pub mod api;
pub mod classifier;
pub mod config;
pub mod gateway;
pub mod grpc;
pub mod metrics;
pub mod normalizer;
pub mod ollama;
pub mod policy;
pub mod tracing;
pub mod triage;

// Re-export commonly used types at crate root for convenience
pub use classifier::{Classifier, Diagnosis, RuleClassifier, Severity, SuggestedAction, ValidatingClassifier};
pub use config::SentinelConfig;
pub use gateway::{MemoryGateway, ToolGateway};
pub use normalizer::{normalize, LogWindow};
pub use policy::{decide, Decision, DecisionAction, PolicyConfig};
pub use triage::{IncidentHistory, TriageConfig, TriageController, TriageError, TriageReport};
