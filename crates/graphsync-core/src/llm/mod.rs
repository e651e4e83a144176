//! LLM integration for entity extraction
//!
//! A thin client for OpenAI-compatible `/chat/completions` in JSON-object
//! mode, with retries on rate limits and server errors.

mod client;
mod types;

pub use client::LlmClient;
pub use types::{ChatMessage, Completion, CompletionRequest, CompletionResponse, Role};
