//! Few-shot LLM classifier
//!
//! Builds a root cause analysis prompt from a set of labelled demos plus the
//! target's log window, asks the chat model for a JSON object, and parses it
//! strictly into a [`Diagnosis`].
//!
//! ```text
//! system: task + output contract
//! user:   demo 1 (container, logs)     assistant: demo 1 answer (JSON)
//! user:   demo 2 ...                   assistant: ...
//! user:   target container + logs  ->  assistant: diagnosis JSON
//! ```
//!
//! Demos come from a compiled demo file when one is configured, otherwise
//! from a small built-in set.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ClassificationError, Classifier, Diagnosis, Severity, SuggestedAction};
use crate::normalizer::LogWindow;
use crate::ollama::{extract_json_object, ChatClient, ChatMessage};

/// System prompt describing the output contract
pub const RCA_SYSTEM_PROMPT: &str = r#"You are an SRE assistant performing root cause analysis on container logs.

Given the name of a service and its recent logs, reply with a single JSON object with these fields:
- "reasoning": step-by-step analysis of the error or stack trace
- "root_cause": the specific technical fault (e.g. OOMKilled, Segfault, Auth Failure), or "None"
- "severity": one of "low", "medium", "high", "critical"
- "suggested_action": one of "restart_service", "escalate", "ignore"
- "confidence": a number between 0 and 1

Restart only when a restart is likely to recover the service. Escalate faults that need a human (credentials, configuration, data). Ignore healthy logs."#;

/// A labelled example shown to the model before the real question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotDemo {
    pub container_name: String,
    pub logs: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    pub root_cause: String,
    pub severity: String,
    pub suggested_action: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl FewShotDemo {
    fn question(&self) -> String {
        render_question(&self.container_name, &self.logs)
    }

    fn answer(&self) -> String {
        serde_json::json!({
            "reasoning": self.reasoning.clone().unwrap_or_default(),
            "root_cause": self.root_cause,
            "severity": self.severity.to_ascii_lowercase(),
            "suggested_action": self.suggested_action,
            "confidence": self.confidence.unwrap_or(0.9),
        })
        .to_string()
    }
}

/// Demos used when no compiled demo file is configured
pub fn builtin_demos() -> Vec<FewShotDemo> {
    vec![
        FewShotDemo {
            container_name: "production-db".into(),
            logs: "FATAL: Password authentication failed for user 'admin'. Connection closed.".into(),
            reasoning: Some(
                "The logs show a clear authentication failure. This is likely a configuration issue in the client, not the DB itself.".into(),
            ),
            root_cause: "Auth Failure".into(),
            severity: "critical".into(),
            suggested_action: "escalate".into(),
            confidence: Some(0.9),
        },
        FewShotDemo {
            container_name: "frontend-ui".into(),
            logs: "INFO: Rendered page in 20ms. INFO: Cache hit.".into(),
            reasoning: Some("All logs are INFO level. No errors detected.".into()),
            root_cause: "None".into(),
            severity: "low".into(),
            suggested_action: "none".into(),
            confidence: Some(0.95),
        },
        FewShotDemo {
            container_name: "worker-node".into(),
            logs: "Error: Java heap space. java.lang.OutOfMemoryError. Terminating process.".into(),
            reasoning: Some(
                "The application ran out of memory and crashed. It needs a restart to recover temporarily.".into(),
            ),
            root_cause: "OOMKilled".into(),
            severity: "high".into(),
            suggested_action: "restart_service".into(),
            confidence: Some(0.9),
        },
    ]
}

/// Load demos from a compiled demo file.
///
/// Accepts a plain JSON array of demos, `{"demos": [...]}`, or a compiled
/// program file of the shape `{"<predictor>": {"demos": [...]}, ...}`.
pub fn load_demos(path: &Path) -> Result<Vec<FewShotDemo>, ClassificationError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ClassificationError::Backend(format!("cannot read demo file {}: {}", path.display(), e)))?;
    parse_demos(&text)
}

fn parse_demos(text: &str) -> Result<Vec<FewShotDemo>, ClassificationError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ClassificationError::Malformed(format!("demo file is not JSON: {}", e)))?;

    let demos = match &value {
        Value::Array(_) => value.clone(),
        Value::Object(map) => match map.get("demos") {
            Some(demos) => demos.clone(),
            None => Value::Array(
                map.values()
                    .filter_map(|v| v.get("demos"))
                    .filter_map(Value::as_array)
                    .flatten()
                    .cloned()
                    .collect(),
            ),
        },
        _ => return Err(ClassificationError::Malformed("demo file must be an array or object".into())),
    };

    serde_json::from_value(demos).map_err(|e| ClassificationError::Malformed(format!("invalid demo: {}", e)))
}

fn render_question(container_name: &str, logs: &str) -> String {
    format!("Container Name: {}\n\nLogs:\n{}", container_name, logs)
}

/// Settings for [`LlmClassifier`]
#[derive(Debug, Clone)]
pub struct LlmClassifierConfig {
    pub model: String,
    pub demos: Vec<FewShotDemo>,
}

impl Default for LlmClassifierConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            demos: builtin_demos(),
        }
    }
}

/// Classifier that delegates root cause analysis to a chat model
#[derive(Clone)]
pub struct LlmClassifier {
    client: ChatClient,
    config: LlmClassifierConfig,
}

impl LlmClassifier {
    pub fn new(client: ChatClient, config: LlmClassifierConfig) -> Self {
        info!(model = %config.model, demos = config.demos.len(), "LLM classifier ready");
        Self { client, config }
    }

    /// Build a classifier using demos from `demos_path` when it exists.
    ///
    /// A missing file falls back to the built-in demos; an unreadable or
    /// invalid one is an error.
    pub fn from_demo_file(
        client: ChatClient,
        model: impl Into<String>,
        demos_path: Option<&Path>,
    ) -> Result<Self, ClassificationError> {
        let demos = match demos_path {
            Some(path) if path.exists() => {
                let demos = load_demos(path)?;
                info!(path = %path.display(), count = demos.len(), "Loaded compiled demos");
                demos
            }
            Some(path) => {
                warn!(path = %path.display(), "No compiled demo file found, using built-in demos");
                builtin_demos()
            }
            None => builtin_demos(),
        };

        Ok(Self::new(
            client,
            LlmClassifierConfig {
                model: model.into(),
                demos,
            },
        ))
    }

    /// Assemble the full conversation for one window
    pub fn messages(&self, window: &LogWindow) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(RCA_SYSTEM_PROMPT)];
        for demo in &self.config.demos {
            messages.push(ChatMessage::user(demo.question()));
            messages.push(ChatMessage::assistant(demo.answer()));
        }
        messages.push(ChatMessage::user(render_question(
            window.source().unwrap_or("unknown"),
            &window.text(),
        )));
        messages
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn diagnose(&self, window: &LogWindow) -> Result<Diagnosis, ClassificationError> {
        let messages = self.messages(window);
        let response = self
            .client
            .chat(&messages, &self.config.model, window.trace_id())
            .await
            .map_err(|e| ClassificationError::Backend(e.to_string()))?;

        debug!(
            eval_count = response.eval_count,
            eval_duration_ns = response.eval_duration,
            "LLM diagnosis received"
        );
        parse_diagnosis(&response.message.content)
    }
}

/// Strictly parse a model reply into a diagnosis. Nothing is defaulted.
pub fn parse_diagnosis(content: &str) -> Result<Diagnosis, ClassificationError> {
    let value = extract_json_object(content)
        .ok_or_else(|| ClassificationError::Malformed("reply contains no JSON object".into()))?;

    let root_cause = text_field(&value, "root_cause")?;
    let severity: Severity = text_field(&value, "severity")?.parse()?;
    let suggested_action: SuggestedAction = text_field(&value, "suggested_action")?.parse()?;
    let confidence = match value.get("confidence") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ClassificationError::Malformed("confidence is not a number".into()))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ClassificationError::Malformed(format!("confidence '{}' is not a number", s)))?,
        _ => return Err(ClassificationError::Malformed("missing field 'confidence'".into())),
    };

    let diagnosis = Diagnosis::new(root_cause, severity, suggested_action, confidence)?;
    Ok(match value.get("reasoning").and_then(Value::as_str) {
        Some(reasoning) => diagnosis.with_reasoning(reasoning),
        None => diagnosis,
    })
}

fn text_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, ClassificationError> {
    value
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ClassificationError::Malformed(format!("missing string field '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;

    #[test]
    fn test_parse_full_reply() {
        let reply = r#"{"reasoning": "Heap exhausted", "root_cause": "OOMKilled", "severity": "HIGH", "suggested_action": "restart_service", "confidence": 0.88}"#;
        let d = parse_diagnosis(reply).unwrap();
        assert_eq!(d.root_cause(), "OOMKilled");
        assert_eq!(d.severity(), Severity::High);
        assert_eq!(d.suggested_action(), SuggestedAction::Restart);
        assert_eq!(d.confidence(), 0.88);
        assert_eq!(d.reasoning(), Some("Heap exhausted"));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let reply = r#"{"root_cause": "OOMKilled", "severity": "high", "suggested_action": "restart"}"#;
        assert!(matches!(parse_diagnosis(reply), Err(ClassificationError::Malformed(_))));

        assert!(matches!(
            parse_diagnosis("I think the service is fine."),
            Err(ClassificationError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_values_are_malformed() {
        let reply = r#"{"root_cause": "x", "severity": "apocalyptic", "suggested_action": "restart", "confidence": 0.5}"#;
        assert!(matches!(parse_diagnosis(reply), Err(ClassificationError::Malformed(_))));
    }

    #[test]
    fn test_out_of_range_confidence() {
        let reply = r#"{"root_cause": "x", "severity": "low", "suggested_action": "ignore", "confidence": 7}"#;
        assert_eq!(parse_diagnosis(reply), Err(ClassificationError::InvalidConfidence(7.0)));
    }

    #[test]
    fn test_parse_demo_file_shapes() {
        let demo = r#"{"container_name": "db", "logs": "FATAL", "root_cause": "Auth Failure", "severity": "CRITICAL", "suggested_action": "escalate"}"#;

        let array = parse_demos(&format!("[{}]", demo)).unwrap();
        assert_eq!(array.len(), 1);

        let wrapped = parse_demos(&format!(r#"{{"demos": [{}]}}"#, demo)).unwrap();
        assert_eq!(wrapped, array);

        let compiled = parse_demos(&format!(r#"{{"prog": {{"demos": [{}], "lm": null}}, "metadata": {{}}}}"#, demo)).unwrap();
        assert_eq!(compiled, array);

        assert!(parse_demos("42").is_err());
    }

    #[test]
    fn test_prompt_layout() {
        let classifier = LlmClassifier::new(ChatClient::new("http://localhost:11434"), LlmClassifierConfig::default());
        let window = normalize("java.lang.OutOfMemoryError", 10).unwrap().labelled("worker-node");
        let messages = classifier.messages(&window);

        // system + 3 demo pairs + question
        assert_eq!(messages.len(), 8);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[2].role, "assistant");
        assert!(messages[7].content.contains("Container Name: worker-node"));
        assert!(messages[7].content.contains("OutOfMemoryError"));
        assert!(parse_diagnosis(&messages[2].content).is_ok());
    }

    #[test]
    fn test_missing_demo_file_uses_builtins() {
        let classifier = LlmClassifier::from_demo_file(
            ChatClient::new("http://localhost:11434"),
            "llama3.2",
            Some(Path::new("/nonexistent/brain_compiled.json")),
        )
        .unwrap();
        assert_eq!(classifier.config.demos, builtin_demos());
    }

    /// Captured `X-Trace-Id` header and request body of the last chat call
    type Seen = std::sync::Arc<std::sync::Mutex<Option<(Option<String>, Value)>>>;

    /// Serve a canned `/api/chat` reply on a local port
    async fn fake_ollama(reply: &'static str) -> (String, Seen) {
        use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};

        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/api/chat",
                post(move |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    let trace_id = headers
                        .get("x-trace-id")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    *seen.lock().unwrap() = Some((trace_id, body));
                    Json(serde_json::json!({
                        "message": {"role": "assistant", "content": reply},
                        "done": true
                    }))
                }),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}", addr), seen)
    }

    #[tokio::test]
    async fn test_diagnose_sends_trace_id() {
        let (url, seen) = fake_ollama(
            r#"{"root_cause": "OOM", "severity": "critical", "suggested_action": "restart", "confidence": 0.9}"#,
        )
        .await;
        let classifier = LlmClassifier::new(ChatClient::new(url), LlmClassifierConfig::default());
        let window = normalize("java.lang.OutOfMemoryError", 10)
            .unwrap()
            .labelled("worker-node")
            .with_trace_id("0190c2a8-7d3e-7000-8000-000000000001");

        let d = classifier.diagnose(&window).await.unwrap();
        assert_eq!(d.root_cause(), "OOM");

        let (trace_id, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(trace_id.as_deref(), Some("0190c2a8-7d3e-7000-8000-000000000001"));
        assert_eq!(body["format"], "json");
        assert_eq!(body["model"], "llama3.2");
    }

    #[tokio::test]
    async fn test_prose_reply_is_malformed() {
        let (url, _seen) = fake_ollama("The container looks unhealthy.").await;
        let classifier = LlmClassifier::new(ChatClient::new(url), LlmClassifierConfig::default());
        let window = normalize("ERROR boom", 10).unwrap();
        assert!(matches!(
            classifier.diagnose(&window).await,
            Err(ClassificationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let classifier = LlmClassifier::new(ChatClient::new("http://127.0.0.1:1"), LlmClassifierConfig::default());
        let window = normalize("ERROR boom", 10).unwrap();
        assert!(matches!(
            classifier.diagnose(&window).await,
            Err(ClassificationError::Backend(_))
        ));
    }
}
