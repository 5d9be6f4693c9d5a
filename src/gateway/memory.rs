//! In-memory gateway with scripted targets
//!
//! Used by tests and dry runs: every target has canned logs, a canned restart
//! result, and optional artificial latency so timeout handling can be exercised
//! without a container runtime.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GatewayError, Target, TargetStatus, ToolGateway};

#[derive(Debug, Clone)]
struct ScriptedTarget {
    status: TargetStatus,
    logs: Result<String, GatewayError>,
    restart: Result<bool, GatewayError>,
    fetch_delay: Duration,
    restart_delay: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    fetches: HashMap<String, usize>,
    restarts_issued: HashMap<String, usize>,
    restarts_completed: HashMap<String, usize>,
}

/// Scripted [`ToolGateway`] implementation
#[derive(Debug, Default)]
pub struct MemoryGateway {
    targets: Mutex<BTreeMap<String, ScriptedTarget>>,
    list_failure: Mutex<Option<GatewayError>>,
    counters: Mutex<Counters>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a running target whose logs are `logs` and whose restart succeeds
    pub fn with_target(self, id: impl Into<String>, logs: impl Into<String>) -> Self {
        self.lock_targets().insert(
            id.into(),
            ScriptedTarget {
                status: TargetStatus::Running,
                logs: Ok(logs.into()),
                restart: Ok(true),
                fetch_delay: Duration::ZERO,
                restart_delay: Duration::ZERO,
            },
        );
        self
    }

    /// Make log fetches for `id` fail with `error`
    pub fn with_fetch_error(self, id: &str, error: GatewayError) -> Self {
        self.update(id, |t| t.logs = Err(error));
        self
    }

    pub fn with_restart_result(self, id: &str, result: Result<bool, GatewayError>) -> Self {
        self.update(id, |t| t.restart = result);
        self
    }

    pub fn with_fetch_delay(self, id: &str, delay: Duration) -> Self {
        self.update(id, |t| t.fetch_delay = delay);
        self
    }

    pub fn with_restart_delay(self, id: &str, delay: Duration) -> Self {
        self.update(id, |t| t.restart_delay = delay);
        self
    }

    pub fn with_list_error(self, error: GatewayError) -> Self {
        *self.list_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
        self
    }

    /// Replace the logs a target returns from now on
    pub fn set_logs(&self, id: &str, logs: impl Into<String>) {
        let logs = logs.into();
        self.update(id, |t| t.logs = Ok(logs));
    }

    pub fn fetch_calls(&self, id: &str) -> usize {
        self.lock_counters().fetches.get(id).copied().unwrap_or(0)
    }

    /// Restart calls that reached the gateway
    pub fn restart_calls(&self, id: &str) -> usize {
        self.lock_counters().restarts_issued.get(id).copied().unwrap_or(0)
    }

    /// Restart calls that ran to completion
    pub fn restarts_completed(&self, id: &str) -> usize {
        self.lock_counters().restarts_completed.get(id).copied().unwrap_or(0)
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut ScriptedTarget)) {
        if let Some(target) = self.lock_targets().get_mut(id) {
            f(target);
        }
    }

    fn scripted(&self, id: &str) -> Result<ScriptedTarget, GatewayError> {
        self.lock_targets()
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::TargetNotFound(id.to_string()))
    }

    fn lock_targets(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ScriptedTarget>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ToolGateway for MemoryGateway {
    async fn list_targets(&self) -> Result<Vec<Target>, GatewayError> {
        if let Some(err) = self.list_failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        Ok(self
            .lock_targets()
            .iter()
            .map(|(id, t)| Target::new(id.clone(), t.status))
            .collect())
    }

    async fn fetch_logs(&self, target_id: &str, tail_lines: usize) -> Result<String, GatewayError> {
        let target = self.scripted(target_id)?;
        *self.lock_counters().fetches.entry(target_id.to_string()).or_default() += 1;

        if !target.fetch_delay.is_zero() {
            tokio::time::sleep(target.fetch_delay).await;
        }

        let logs = target.logs?;
        let lines: Vec<&str> = logs.lines().collect();
        let start = lines.len().saturating_sub(tail_lines);
        Ok(lines[start..].join("\n"))
    }

    async fn restart(&self, target_id: &str) -> Result<bool, GatewayError> {
        let target = self.scripted(target_id)?;
        *self
            .lock_counters()
            .restarts_issued
            .entry(target_id.to_string())
            .or_default() += 1;

        if !target.restart_delay.is_zero() {
            tokio::time::sleep(target.restart_delay).await;
        }

        *self
            .lock_counters()
            .restarts_completed
            .entry(target_id.to_string())
            .or_default() += 1;
        target.restart
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_targets() {
        let gateway = MemoryGateway::new()
            .with_target("web", "a\nb\nc")
            .with_target("db", "ok")
            .with_restart_result("db", Ok(false));

        let ids: Vec<_> = gateway
            .list_targets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["db", "web"]);

        assert_eq!(gateway.fetch_logs("web", 2).await.unwrap(), "b\nc");
        assert_eq!(gateway.fetch_calls("web"), 1);
        assert_eq!(gateway.restart("db").await, Ok(false));
        assert_eq!(gateway.restart_calls("db"), 1);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let gateway = MemoryGateway::new();
        assert_eq!(
            gateway.fetch_logs("ghost", 10).await,
            Err(GatewayError::TargetNotFound("ghost".into()))
        );
    }
}
