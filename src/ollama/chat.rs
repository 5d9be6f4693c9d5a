//! Ollama Chat API client
//!
//! Thin client for the `/api/chat` endpoint. The LLM classifier asks for
//! JSON-formatted replies, so the client also knows how to pull the first
//! JSON object out of a reply that wraps it in prose or code fences.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub done: bool,
    #[serde(default)]
    pub eval_count: u32,
    #[serde(default)]
    pub eval_duration: u64,
}

/// Error type for chat operations
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("ollama returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("empty response from Ollama")]
    EmptyResponse,
}

/// Client for Ollama's /api/chat endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a non-streaming chat request asking for a JSON reply
    ///
    /// # Arguments
    /// * `messages` - The conversation so far
    /// * `model` - The model name (e.g., "llama3.2")
    /// * `trace_id` - Optional trace ID, sent as `X-Trace-Id`
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        trace_id: Option<&str>,
    ) -> Result<ChatResponse, ChatError> {
        let endpoint = format!("{}/api/chat", self.base_url);

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": 0.0
            }
        });

        let mut request = self.client.post(&endpoint).json(&body);
        if let Some(tid) = trace_id {
            request = request.header("X-Trace-Id", tid);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        Ok(chat_response)
    }
}

/// Find the first complete top-level JSON object in `content`.
///
/// Handles replies where the model wraps its JSON in prose or markdown
/// fences. Braces inside string literals are skipped.
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let content = content.trim();

    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(content) {
        return Some(value);
    }

    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value @ serde_json::Value::Object(_)) =
                            serde_json::from_str::<serde_json::Value>(&content[s..=i])
                        {
                            return Some(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    None
}
