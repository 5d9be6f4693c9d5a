//! Session-scoped incident history
//!
//! Every triage cycle appends exactly one [`IncidentRecord`] to the current
//! session. The session also answers how many restarts a target has had,
//! which feeds the restart cap. Ended sessions can be archived to disk and
//! reloaded later.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::Diagnosis;
use crate::metrics::SESSION_RECORDS;
use crate::policy::{Decision, DecisionAction};

/// What happened at the end of a triage cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing was done (no_op decision)
    Skipped,
    Escalated,
    Restarted,
    /// The runtime reported that the restart did not succeed
    RestartFailed,
    /// The cycle stopped on an error
    Failed { kind: String, message: String },
}

impl Outcome {
    pub fn failed(kind: &str, message: impl Into<String>) -> Self {
        Outcome::Failed {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Skipped => "skipped",
            Outcome::Escalated => "escalated",
            Outcome::Restarted => "restarted",
            Outcome::RestartFailed => "restart_failed",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Append-only audit entry for one triage cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    /// Absent when the cycle failed before classification
    pub diagnosis: Option<Diagnosis>,
    pub decision: Decision,
    pub outcome: Outcome,
}

/// All records of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<IncidentRecord>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            started_at: Utc::now(),
            records: Vec::new(),
        }
    }

    /// Restart attempts recorded for `target_id`, whatever their outcome
    pub fn retry_count(&self, target_id: &str) -> u32 {
        let count = self
            .records
            .iter()
            .filter(|r| r.target_id == target_id && r.decision.action == DecisionAction::Restart)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

/// Process-local history for the current session
#[derive(Debug)]
pub struct IncidentHistory {
    current: RwLock<Session>,
}

impl Default for IncidentHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentHistory {
    pub fn new() -> Self {
        SESSION_RECORDS.set(0.0);
        Self {
            current: RwLock::new(Session::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.read().id
    }

    /// Build a record for the current session and append it in one step
    pub fn append(
        &self,
        target_id: &str,
        diagnosis: Option<Diagnosis>,
        decision: Decision,
        outcome: Outcome,
    ) -> IncidentRecord {
        let mut session = self.write();
        let record = IncidentRecord {
            id: Uuid::now_v7(),
            session_id: session.id,
            target_id: target_id.to_string(),
            timestamp: Utc::now(),
            diagnosis,
            decision,
            outcome,
        };
        session.records.push(record.clone());
        SESSION_RECORDS.set(session.records.len() as f64);
        record
    }

    pub fn retry_count(&self, target_id: &str) -> u32 {
        self.read().retry_count(target_id)
    }

    pub fn records(&self) -> Vec<IncidentRecord> {
        self.read().records.clone()
    }

    pub fn records_for(&self, target_id: &str) -> Vec<IncidentRecord> {
        self.read()
            .records
            .iter()
            .filter(|r| r.target_id == target_id)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    /// End the current session and start an empty one. Returns the ended session.
    pub fn reset(&self) -> Session {
        let ended = std::mem::replace(&mut *self.write(), Session::new());
        SESSION_RECORDS.set(0.0);
        tracing::info!(session_id = %ended.id, records = ended.records.len(), "Session reset");
        ended
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Summary of an archived session for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: usize,
    pub restarts: usize,
    pub escalations: usize,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            started_at: session.started_at,
            records: session.records.len(),
            restarts: session
                .records
                .iter()
                .filter(|r| r.decision.action == DecisionAction::Restart)
                .count(),
            escalations: session
                .records
                .iter()
                .filter(|r| r.decision.action == DecisionAction::Escalate)
                .count(),
        }
    }
}

/// On-disk archive of ended sessions, one JSON file per session
#[derive(Debug, Clone)]
pub struct SessionArchive {
    /// Base directory for session files
    base_dir: PathBuf,
}

impl SessionArchive {
    /// Open an archive, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn save(&self, session: &Session) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(self.session_path(&session.id.to_string()), json)
    }

    pub fn load(&self, session_id: &str) -> std::io::Result<Session> {
        Self::load_from_path(&self.session_path(session_id))
    }

    /// List archived sessions, newest first. Unreadable files are skipped.
    pub fn list(&self) -> std::io::Result<Vec<SessionSummary>> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match Self::load_from_path(&path) {
                    Ok(session) => sessions.push(SessionSummary::from(&session)),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session file"),
                }
            }
        }
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    pub fn delete(&self, session_id: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.session_path(session_id))
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        // ids are UUIDs; strip anything that could escape the directory
        let file: String = session_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        self.base_dir.join(format!("{}.json", file))
    }

    fn load_from_path(path: &Path) -> std::io::Result<Session> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
