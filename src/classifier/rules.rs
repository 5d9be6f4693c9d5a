//! Deterministic signature-table classifier
//!
//! Scans the log window for known error signatures. The table is ordered and
//! the first signature found anywhere in the window wins, so specific
//! signatures must come before generic ones ("ERROR").

use async_trait::async_trait;

use super::{ClassificationError, Classifier, Diagnosis, Severity, SuggestedAction};
use crate::normalizer::LogWindow;

/// One row of the signature table
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Substrings that trigger this row (any of them)
    pub patterns: Vec<String>,
    /// Match ignoring ASCII case
    pub case_insensitive: bool,
    pub root_cause: String,
    pub severity: Severity,
    pub suggested_action: SuggestedAction,
    pub confidence: f64,
}

impl Signature {
    pub fn new(
        patterns: &[&str],
        root_cause: &str,
        severity: Severity,
        suggested_action: SuggestedAction,
        confidence: f64,
    ) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            case_insensitive: false,
            root_cause: root_cause.to_string(),
            severity,
            suggested_action,
            confidence,
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    fn matches(&self, line: &str, lowered: &str) -> bool {
        self.patterns.iter().any(|p| {
            if self.case_insensitive {
                lowered.contains(&p.to_ascii_lowercase())
            } else {
                line.contains(p.as_str())
            }
        })
    }
}

/// Classifier backed by an ordered signature table
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    table: Vec<Signature>,
    fallback: Signature,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new(default_table())
    }
}

impl RuleClassifier {
    /// Build a classifier from a custom table (checked in order)
    pub fn new(table: Vec<Signature>) -> Self {
        Self {
            table,
            fallback: Signature::new(&[], "None", Severity::Low, SuggestedAction::Ignore, 0.9),
        }
    }

    pub fn table(&self) -> &[Signature] {
        &self.table
    }

    fn matching(&self, window: &LogWindow) -> &Signature {
        let lowered: Vec<String> = window.lines().iter().map(|l| l.to_ascii_lowercase()).collect();
        self.table
            .iter()
            .find(|sig| {
                window
                    .lines()
                    .iter()
                    .zip(&lowered)
                    .any(|(line, low)| sig.matches(line, low))
            })
            .unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn diagnose(&self, window: &LogWindow) -> Result<Diagnosis, ClassificationError> {
        let sig = self.matching(window);
        tracing::debug!(
            source = window.source().unwrap_or("-"),
            root_cause = %sig.root_cause,
            "Rule classifier matched"
        );
        Diagnosis::new(sig.root_cause.clone(), sig.severity, sig.suggested_action, sig.confidence)
    }
}

/// Built-in signatures, most specific first
pub fn default_table() -> Vec<Signature> {
    use Severity::*;
    use SuggestedAction::*;

    vec![
        Signature::new(&["OutOfMemoryError"], "OOM", Critical, Restart, 0.95),
        Signature::new(&["OOMKilled", "Out of memory", "heap space", "Cannot allocate memory"], "OOMKilled", High, Restart, 0.9),
        Signature::new(&["SIGSEGV", "Segmentation fault", "segfault"], "Segfault", High, Restart, 0.85),
        Signature::new(&["authentication failed", "Access denied for user", "permission denied"], "Auth Failure", Critical, Escalate, 0.9)
            .ignore_case(),
        Signature::new(&["Connection refused", "ECONNREFUSED"], "Dependency Unreachable", High, Escalate, 0.8)
            .ignore_case(),
        Signature::new(&["No space left on device"], "Disk Full", Critical, Escalate, 0.9),
        Signature::new(&["panicked at", "panic:"], "Application Panic", High, Restart, 0.8),
        Signature::new(&["FATAL"], "Fatal Error", High, Escalate, 0.75),
        Signature::new(&["CRITICAL"], "Critical Error", High, Escalate, 0.75),
        Signature::new(&["ERROR", "Exception"], "Application Error", Medium, Escalate, 0.6),
    ]
}
