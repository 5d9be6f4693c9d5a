//! Decision policy
//!
//! Pure mapping from a diagnosis and the target's restart history to a
//! bounded remediation decision:
//!
//! ```text
//! confidence < threshold ──► severity >= floor ? escalate : no_op
//!        │
//!        ▼
//! suggests restart ──► retry_count < max_retries ? restart : escalate (cap)
//!        │
//!        ▼
//! suggests escalate ──► escalate
//!        │
//!        ▼
//!      no_op
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classifier::{Diagnosis, Severity, SuggestedAction};

pub const REASON_LOW_CONFIDENCE: &str = "low confidence";
pub const REASON_LOW_CONFIDENCE_HIGH_SEVERITY: &str = "low confidence but high severity";
pub const REASON_RESTART: &str = "classifier recommended restart";
pub const REASON_RESTART_CAP: &str = "restart cap exceeded";
pub const REASON_ESCALATE: &str = "classifier recommended escalation";
pub const REASON_IGNORE: &str = "classifier recommended ignore";
/// Used by the orchestrator when the log window is empty
pub const REASON_NOTHING_TO_DIAGNOSE: &str = "nothing to diagnose";

/// Thresholds the policy decides against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum confidence required to act on a suggestion
    pub confidence_threshold: f64,
    /// Restarts allowed per target per session
    pub max_retries: u32,
    /// Low-confidence diagnoses at or above this severity are escalated
    pub escalate_severity_floor: Severity,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_retries: 1,
            escalate_severity_floor: Severity::High,
        }
    }
}

/// What the orchestrator does about a diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    NoOp,
    Restart,
    Escalate,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::NoOp => "no_op",
            DecisionAction::Restart => "restart",
            DecisionAction::Escalate => "escalate",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub reason: String,
}

impl Decision {
    pub fn new(action: DecisionAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
        }
    }

    pub fn no_op(reason: impl Into<String>) -> Self {
        Self::new(DecisionAction::NoOp, reason)
    }
}

/// Decide what to do about `diagnosis` given `retry_count` restarts already
/// attempted on the target in this session.
pub fn decide(diagnosis: &Diagnosis, retry_count: u32, config: &PolicyConfig) -> Decision {
    if diagnosis.confidence() < config.confidence_threshold {
        return if diagnosis.severity() >= config.escalate_severity_floor {
            Decision::new(DecisionAction::Escalate, REASON_LOW_CONFIDENCE_HIGH_SEVERITY)
        } else {
            Decision::new(DecisionAction::NoOp, REASON_LOW_CONFIDENCE)
        };
    }

    match diagnosis.suggested_action() {
        SuggestedAction::Restart if retry_count < config.max_retries => {
            Decision::new(DecisionAction::Restart, REASON_RESTART)
        }
        SuggestedAction::Restart => Decision::new(DecisionAction::Escalate, REASON_RESTART_CAP),
        SuggestedAction::Escalate => Decision::new(DecisionAction::Escalate, REASON_ESCALATE),
        SuggestedAction::Ignore => Decision::new(DecisionAction::NoOp, REASON_IGNORE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEVERITIES: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];
    const ACTIONS: [SuggestedAction; 3] = [SuggestedAction::Ignore, SuggestedAction::Restart, SuggestedAction::Escalate];

    fn diagnosis(severity: Severity, action: SuggestedAction, confidence: f64) -> Diagnosis {
        Diagnosis::new("test", severity, action, confidence).unwrap()
    }

    #[test]
    fn test_confident_restart() {
        let d = diagnosis(Severity::Critical, SuggestedAction::Restart, 0.95);
        assert_eq!(
            decide(&d, 0, &PolicyConfig::default()),
            Decision::new(DecisionAction::Restart, "classifier recommended restart")
        );
    }

    #[test]
    fn test_restart_cap() {
        let d = diagnosis(Severity::Critical, SuggestedAction::Restart, 0.95);
        assert_eq!(
            decide(&d, 1, &PolicyConfig::default()),
            Decision::new(DecisionAction::Escalate, "restart cap exceeded")
        );
    }

    #[test]
    fn test_low_confidence_low_severity() {
        let d = diagnosis(Severity::Low, SuggestedAction::Restart, 0.4);
        assert_eq!(
            decide(&d, 0, &PolicyConfig::default()),
            Decision::new(DecisionAction::NoOp, "low confidence")
        );
    }

    #[test]
    fn test_low_confidence_high_severity() {
        let d = diagnosis(Severity::Critical, SuggestedAction::Ignore, 0.4);
        assert_eq!(
            decide(&d, 0, &PolicyConfig::default()),
            Decision::new(DecisionAction::Escalate, "low confidence but high severity")
        );
    }

    #[test]
    fn test_escalate_and_ignore() {
        let config = PolicyConfig::default();
        assert_eq!(
            decide(&diagnosis(Severity::Medium, SuggestedAction::Escalate, 0.8), 0, &config).reason,
            REASON_ESCALATE
        );
        assert_eq!(
            decide(&diagnosis(Severity::Low, SuggestedAction::Ignore, 0.9), 0, &config),
            Decision::no_op(REASON_IGNORE)
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let d = diagnosis(Severity::Low, SuggestedAction::Restart, 0.7);
        assert_eq!(decide(&d, 0, &PolicyConfig::default()).action, DecisionAction::Restart);
    }

    #[test]
    fn test_zero_max_retries_never_restarts() {
        let config = PolicyConfig {
            max_retries: 0,
            ..PolicyConfig::default()
        };
        let d = diagnosis(Severity::High, SuggestedAction::Restart, 1.0);
        assert_eq!(decide(&d, 0, &config).reason, REASON_RESTART_CAP);
    }

    #[test]
    fn test_low_confidence_below_floor_is_always_no_op() {
        let config = PolicyConfig::default();
        for severity in SEVERITIES.iter().filter(|s| **s < config.escalate_severity_floor) {
            for action in ACTIONS {
                for retry in 0..3 {
                    let decision = decide(&diagnosis(*severity, action, 0.69), retry, &config);
                    assert_eq!(decision.action, DecisionAction::NoOp);
                }
            }
        }
    }

    #[test]
    fn test_restart_only_below_cap() {
        let config = PolicyConfig::default();
        for severity in SEVERITIES {
            for confidence in [0.0, 0.5, 0.7, 0.9, 1.0] {
                for action in ACTIONS {
                    for retry in 0..4 {
                        let decision = decide(&diagnosis(severity, action, confidence), retry, &config);
                        if decision.action == DecisionAction::Restart {
                            assert_eq!(action, SuggestedAction::Restart);
                            assert!(confidence >= config.confidence_threshold);
                            assert!(retry < config.max_retries);
                        }
                        if action == SuggestedAction::Restart
                            && confidence >= config.confidence_threshold
                            && retry >= config.max_retries
                        {
                            assert_eq!(decision.action, DecisionAction::Escalate);
                        }
                        // same inputs, same decision
                        assert_eq!(decision, decide(&diagnosis(severity, action, confidence), retry, &config));
                    }
                }
            }
        }
    }

    #[test]
    fn test_action_serialization() {
        assert_eq!(serde_json::to_string(&DecisionAction::NoOp).unwrap(), "\"no_op\"");
        assert_eq!(DecisionAction::Escalate.to_string(), "escalate");
    }
}
