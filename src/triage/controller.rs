//! Triage Controller - drives fetch → normalize → classify → decide → act
//!
//! One call to [`TriageController::triage`] is one triage cycle for one
//! target. Every cycle, successful or not, appends exactly one record to the
//! session history before returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::history::{IncidentHistory, IncidentRecord, Outcome};
use crate::classifier::{ClassificationError, Classifier, Diagnosis, Severity};
use crate::gateway::{observe_call, with_timeout, GatewayError, ToolGateway};
use crate::metrics::{CLASSIFIER_DURATION, DECISIONS, RESTARTS, TRIAGE_CYCLES};
use crate::normalizer::{normalize, LogWindow};
use crate::policy::{decide, Decision, DecisionAction, PolicyConfig, REASON_NOTHING_TO_DIAGNOSE};

/// Target id recorded when a sweep fails before any target is known
pub const SWEEP_TARGET: &str = "*";

/// Limits applied to every cycle
#[derive(Debug, Clone, PartialEq)]
pub struct TriageConfig {
    /// Log lines fetched and kept per window
    pub max_log_lines: usize,
    /// Timeout for list and fetch calls
    pub fetch_timeout: Duration,
    /// Time to wait for a restart to report back (the restart itself keeps running)
    pub restart_timeout: Duration,
    pub classify_timeout: Duration,
    pub policy: PolicyConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            max_log_lines: 200,
            fetch_timeout: Duration::from_secs(10),
            restart_timeout: Duration::from_secs(30),
            classify_timeout: Duration::from_secs(60),
            policy: PolicyConfig::default(),
        }
    }
}

/// Error type for triage cycles
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriageError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
}

impl TriageError {
    /// Taxonomy name of the underlying failure
    pub fn kind(&self) -> &'static str {
        match self {
            TriageError::Gateway(e) => e.kind(),
            TriageError::Classification(e) => e.kind(),
        }
    }
}

/// Result of one cycle, as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageReport {
    pub target_id: String,
    pub record_id: Uuid,
    pub diagnosis: Option<Diagnosis>,
    pub decision: Decision,
    pub outcome: Outcome,
}

impl From<&IncidentRecord> for TriageReport {
    fn from(record: &IncidentRecord) -> Self {
        Self {
            target_id: record.target_id.clone(),
            record_id: record.id,
            diagnosis: record.diagnosis.clone(),
            decision: record.decision.clone(),
            outcome: record.outcome.clone(),
        }
    }
}

/// Notification sent whenever a cycle ends in an escalate decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Escalation {
    pub target_id: String,
    pub record_id: Uuid,
    pub severity: Option<Severity>,
    pub root_cause: Option<String>,
    pub reason: String,
}

/// Per-target result of a sweep
pub type SweepEntry = (String, Result<TriageReport, TriageError>);

/// Orchestrates triage cycles against a gateway and a classifier
pub struct TriageController {
    gateway: Arc<dyn ToolGateway>,
    classifier: Arc<dyn Classifier>,
    history: Arc<IncidentHistory>,
    config: TriageConfig,
    escalations: Option<UnboundedSender<Escalation>>,
    /// Serializes cycles on the same target
    locks: TargetLocks,
}

impl TriageController {
    /// Create a new triage controller
    ///
    /// # Arguments
    /// * `gateway` - Access to list/fetch/restart on targets
    /// * `classifier` - Turns log windows into diagnoses
    /// * `history` - Session history shared with the HTTP API
    /// * `config` - Line bound, timeouts and policy thresholds
    pub fn new(
        gateway: Arc<dyn ToolGateway>,
        classifier: Arc<dyn Classifier>,
        history: Arc<IncidentHistory>,
        config: TriageConfig,
    ) -> Self {
        Self {
            gateway,
            classifier,
            history,
            config,
            escalations: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Send an [`Escalation`] on `tx` for every escalate decision
    pub fn with_escalations(mut self, tx: UnboundedSender<Escalation>) -> Self {
        self.escalations = Some(tx);
        self
    }

    pub fn history(&self) -> &Arc<IncidentHistory> {
        &self.history
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Triage one target when given, otherwise sweep all of them
    pub async fn run(&self, target_id: Option<&str>) -> Result<Vec<SweepEntry>, TriageError> {
        match target_id {
            Some(id) => Ok(vec![(id.to_string(), self.triage(id).await)]),
            None => self.sweep().await,
        }
    }

    /// List all targets and triage them concurrently.
    ///
    /// Fails only when listing fails; per-target failures are reported in
    /// the returned entries.
    pub async fn sweep(&self) -> Result<Vec<SweepEntry>, TriageError> {
        let span = info_span!("triage_sweep", otel.name = "triage_sweep");

        async {
            let targets = match with_timeout("list_targets", self.config.fetch_timeout, self.gateway.list_targets()).await {
                Ok(targets) => targets,
                Err(e) => return Err(self.fail(SWEEP_TARGET, e.into())),
            };

            info!(count = targets.len(), "Sweeping targets");
            let cycles = targets.iter().map(|target| async move {
                let result = self.triage(&target.id).await;
                (target.id.clone(), result)
            });
            Ok(join_all(cycles).await)
        }
        .instrument(span)
        .await
    }

    /// Run one triage cycle for `target_id`
    pub async fn triage(&self, target_id: &str) -> Result<TriageReport, TriageError> {
        let mut slot = self.target_lock(target_id);
        slot.acquire().await;

        let trace_id = Uuid::now_v7().to_string();
        let span = info_span!(
            "triage_cycle",
            trace_id = %trace_id,
            target = %target_id,
            otel.name = "triage_cycle"
        );

        self.cycle(target_id, &trace_id).instrument(span).await
    }

    async fn cycle(&self, target_id: &str, trace_id: &str) -> Result<TriageReport, TriageError> {
        let fetch = self.gateway.fetch_logs(target_id, self.config.max_log_lines);
        let raw = match with_timeout("fetch_logs", self.config.fetch_timeout, fetch).await {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(target_id, e.into())),
        };

        let window = match normalize(&raw, self.config.max_log_lines) {
            Ok(window) => window.labelled(target_id).with_trace_id(trace_id),
            Err(e) => {
                debug!(error = %e, "No log lines to classify");
                let record = self.finish(target_id, None, Decision::no_op(REASON_NOTHING_TO_DIAGNOSE), Outcome::Skipped);
                return Ok(TriageReport::from(&record));
            }
        };
        debug!(lines = window.len(), truncated = window.truncated(), "Log window ready");

        let diagnosis = match self.diagnose(&window).await {
            Ok(diagnosis) => diagnosis,
            Err(e) => return Err(self.fail(target_id, e.into())),
        };

        let retry_count = self.history.retry_count(target_id);
        let decision = decide(&diagnosis, retry_count, &self.config.policy);
        info!(
            root_cause = %diagnosis.root_cause(),
            severity = %diagnosis.severity(),
            confidence = diagnosis.confidence(),
            retry_count,
            action = %decision.action,
            reason = %decision.reason,
            "Decision made"
        );

        let outcome = match decision.action {
            DecisionAction::NoOp => Outcome::Skipped,
            DecisionAction::Escalate => Outcome::Escalated,
            DecisionAction::Restart => match self.restart(target_id).await {
                Ok(true) => Outcome::Restarted,
                Ok(false) => Outcome::RestartFailed,
                Err(e) => {
                    // The attempt still counts toward the cap
                    let error = TriageError::from(e);
                    warn!(error = %error, "Restart did not complete");
                    self.finish(
                        target_id,
                        Some(diagnosis),
                        decision,
                        Outcome::failed(error.kind(), error.to_string()),
                    );
                    return Err(error);
                }
            },
        };

        let record = self.finish(target_id, Some(diagnosis), decision, outcome);
        Ok(TriageReport::from(&record))
    }

    async fn diagnose(&self, window: &LogWindow) -> Result<Diagnosis, ClassificationError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.config.classify_timeout, self.classifier.diagnose(window)).await {
            Ok(result) => result,
            Err(_) => Err(ClassificationError::Timeout(self.config.classify_timeout)),
        };
        CLASSIFIER_DURATION
            .with_label_values(&[self.classifier.name()])
            .observe(start.elapsed().as_secs_f64());
        result
    }

    /// Issue a restart on a detached task and wait up to the restart timeout.
    ///
    /// On timeout the task keeps running; only the wait is abandoned.
    async fn restart(&self, target_id: &str) -> Result<bool, GatewayError> {
        let start = Instant::now();
        let gateway = Arc::clone(&self.gateway);
        let target = target_id.to_string();
        let task = tokio::spawn(async move { gateway.restart(&target).await }.instrument(Span::current()));

        let result = match tokio::time::timeout(self.config.restart_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(GatewayError::Unavailable(format!("restart task failed: {}", join_error))),
            Err(_) => {
                warn!(timeout = ?self.config.restart_timeout, "Restart still in flight after timeout");
                Err(GatewayError::Timeout(format!("after {:?}", self.config.restart_timeout)))
            }
        };

        observe_call("restart", start, &result);
        let label = match &result {
            Ok(true) => "ok",
            Ok(false) => "refused",
            Err(_) => "error",
        };
        RESTARTS.with_label_values(&[label]).inc();
        result
    }

    /// Record a failed cycle and hand the error back
    fn fail(&self, target_id: &str, error: TriageError) -> TriageError {
        warn!(target = %target_id, kind = error.kind(), error = %error, "Triage cycle failed");
        self.finish(
            target_id,
            None,
            Decision::no_op(error.kind()),
            Outcome::failed(error.kind(), error.to_string()),
        );
        error
    }

    fn finish(
        &self,
        target_id: &str,
        diagnosis: Option<Diagnosis>,
        decision: Decision,
        outcome: Outcome,
    ) -> IncidentRecord {
        DECISIONS.with_label_values(&[decision.action.as_str()]).inc();
        TRIAGE_CYCLES.with_label_values(&[outcome.as_str()]).inc();

        let record = self.history.append(target_id, diagnosis, decision, outcome);
        if record.decision.action == DecisionAction::Escalate {
            self.escalate(&record);
        }
        record
    }

    fn escalate(&self, record: &IncidentRecord) {
        let Some(tx) = &self.escalations else {
            return;
        };
        let escalation = Escalation {
            target_id: record.target_id.clone(),
            record_id: record.id,
            severity: record.diagnosis.as_ref().map(|d| d.severity()),
            root_cause: record.diagnosis.as_ref().map(|d| d.root_cause().to_string()),
            reason: record.decision.reason.clone(),
        };
        if tx.send(escalation).is_err() {
            debug!("Escalation receiver dropped");
        }
    }

    fn target_lock(&self, target_id: &str) -> TargetSlot<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = Arc::clone(locks.entry(target_id.to_string()).or_default());
        TargetSlot {
            locks: &self.locks,
            target_id: target_id.to_string(),
            lock,
            guard: None,
        }
    }
}

type TargetLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// A claim on one target's cycle lock.
///
/// Dropping the slot releases the lock and removes the map entry once no
/// other cycle holds or waits on it, so the map only tracks busy targets.
struct TargetSlot<'a> {
    locks: &'a TargetLocks,
    target_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TargetSlot<'_> {
    async fn acquire(&mut self) {
        self.guard = Some(Arc::clone(&self.lock).lock_owned().await);
    }
}

impl Drop for TargetSlot<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.target_id);
        }
    }
}
