//! Triage orchestration
//!
//! Drives triage cycles against the tool gateway and keeps the session-scoped
//! incident history that the restart cap and the HTTP API read from.
//!
//! # Cycle
//!
//! ```text
//! fetch_logs (fetch timeout)
//!      ↓
//! normalize ──── empty ───► record no_op "nothing to diagnose"
//!      ↓
//! diagnose (classify timeout)
//!      ↓
//! decide (retry_count from session history)
//!      ↓
//! restart on a detached task (restart timeout) when the decision says so
//!      ↓
//! append IncidentRecord → emit Escalation if escalating
//! ```

pub mod controller;
pub mod history;

pub use controller::{Escalation, SweepEntry, TriageConfig, TriageController, TriageError, TriageReport, SWEEP_TARGET};
pub use history::{IncidentHistory, IncidentRecord, Outcome, Session, SessionArchive, SessionSummary};
