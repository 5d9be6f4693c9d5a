//! Diagnosis classifiers
//!
//! A classifier maps a normalized [`LogWindow`] to a structured [`Diagnosis`].
//! Two implementations ship with the crate:
//!
//! - [`RuleClassifier`] - deterministic error-signature table
//! - [`LlmClassifier`] - few-shot root cause analysis through a chat model
//!
//! Both are usually wrapped in a [`ValidatingClassifier`], which rejects
//! output that breaks the diagnosis contract instead of letting it reach the
//! decision policy.

pub mod llm;
pub mod rules;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalizer::LogWindow;

pub use llm::{FewShotDemo, LlmClassifier, LlmClassifierConfig};
pub use rules::{RuleClassifier, Signature};

/// Longest root cause kept on a diagnosis, in characters
pub const MAX_ROOT_CAUSE_LEN: usize = 256;

/// Incident severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ClassificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ClassificationError::Malformed(format!("unknown severity '{}'", other))),
        }
    }
}

/// The remediation a classifier recommends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Ignore,
    Restart,
    Escalate,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::Ignore => "ignore",
            SuggestedAction::Restart => "restart",
            SuggestedAction::Escalate => "escalate",
        }
    }
}

impl fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestedAction {
    type Err = ClassificationError;

    /// Accepts the tool-style spellings models tend to produce
    /// (`restart_service`, `none`) alongside the canonical names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('\'').to_ascii_lowercase().as_str() {
            "ignore" | "none" => Ok(SuggestedAction::Ignore),
            "restart" | "restart_service" => Ok(SuggestedAction::Restart),
            "escalate" => Ok(SuggestedAction::Escalate),
            other => Err(ClassificationError::Malformed(format!("unknown suggested action '{}'", other))),
        }
    }
}

/// Failures a classifier may report. None of them is ever turned into a
/// default diagnosis.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassificationError {
    /// Structured output was missing fields or could not be parsed
    #[error("malformed classifier output: {0}")]
    Malformed(String),
    /// Confidence was NaN, infinite, or outside [0, 1]
    #[error("confidence {0} is not a finite value in [0, 1]")]
    InvalidConfidence(f64),
    #[error("root cause is empty")]
    EmptyRootCause,
    /// The underlying model or service could not be reached
    #[error("classifier backend failed: {0}")]
    Backend(String),
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),
}

impl ClassificationError {
    pub fn kind(&self) -> &'static str {
        "ClassificationError"
    }
}

/// Structured classifier output. Immutable once built; every constructor
/// (including deserialization) enforces the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DiagnosisFields")]
pub struct Diagnosis {
    root_cause: String,
    severity: Severity,
    suggested_action: SuggestedAction,
    confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
}

#[derive(Deserialize)]
struct DiagnosisFields {
    root_cause: String,
    severity: Severity,
    suggested_action: SuggestedAction,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

impl TryFrom<DiagnosisFields> for Diagnosis {
    type Error = ClassificationError;

    fn try_from(f: DiagnosisFields) -> Result<Self, Self::Error> {
        Ok(Diagnosis::new(f.root_cause, f.severity, f.suggested_action, f.confidence)?.with_reasoning_opt(f.reasoning))
    }
}

impl Diagnosis {
    /// Build a diagnosis, truncating overly long root causes.
    pub fn new(
        root_cause: impl Into<String>,
        severity: Severity,
        suggested_action: SuggestedAction,
        confidence: f64,
    ) -> Result<Self, ClassificationError> {
        validate_confidence(confidence)?;

        let root_cause = root_cause.into();
        let root_cause = root_cause.trim();
        if root_cause.is_empty() {
            return Err(ClassificationError::EmptyRootCause);
        }

        Ok(Self {
            root_cause: root_cause.chars().take(MAX_ROOT_CAUSE_LEN).collect(),
            severity,
            suggested_action,
            confidence,
            reasoning: None,
        })
    }

    pub fn with_reasoning(self, reasoning: impl Into<String>) -> Self {
        self.with_reasoning_opt(Some(reasoning.into()))
    }

    fn with_reasoning_opt(mut self, reasoning: Option<String>) -> Self {
        self.reasoning = reasoning.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        self
    }

    pub fn root_cause(&self) -> &str {
        &self.root_cause
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        self.suggested_action
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }
}

fn validate_confidence(confidence: f64) -> Result<(), ClassificationError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(ClassificationError::InvalidConfidence(confidence))
    }
}

/// Capability to turn a log window into a diagnosis.
///
/// Implementations may suspend on network calls; callers apply their own
/// timeout around `diagnose`.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name used in logs and metric labels
    fn name(&self) -> &'static str;

    async fn diagnose(&self, window: &LogWindow) -> Result<Diagnosis, ClassificationError>;
}

/// Re-checks the diagnosis contract on the output of an inner classifier.
///
/// [`Diagnosis`] values built through its constructors already hold the
/// contract; this wrapper guards implementations that produce them some other
/// way (e.g. a future `Diagnosis` field added without validation) and is the
/// single place where violations are logged.
pub struct ValidatingClassifier<C> {
    inner: C,
}

impl<C: Classifier> ValidatingClassifier<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Classifier> Classifier for ValidatingClassifier<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn diagnose(&self, window: &LogWindow) -> Result<Diagnosis, ClassificationError> {
        let result = self.inner.diagnose(window).await.and_then(|diagnosis| {
            validate_confidence(diagnosis.confidence())?;
            if diagnosis.root_cause().trim().is_empty() {
                return Err(ClassificationError::EmptyRootCause);
            }
            Ok(diagnosis)
        });

        if let Err(ref e) = result {
            tracing::warn!(classifier = self.inner.name(), error = %e, "Rejected classifier output");
        }
        result
    }
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn diagnose(&self, window: &LogWindow) -> Result<Diagnosis, ClassificationError> {
        (**self).diagnose(window).await
    }
}
