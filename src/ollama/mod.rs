//! Ollama LLM integration module
//!
//! Provides the chat client used by the LLM classifier.

pub mod chat;

pub use chat::{extract_json_object, ChatClient, ChatError, ChatMessage, ChatResponse};
