//! Chat completion wire types (OpenAI-compatible subset)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Absent on some refusals and tool-call replies
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct JsonObjectFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Request body for `/chat/completions` in JSON-object mode
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
    response_format: JsonObjectFormat,
}

impl CompletionRequest {
    /// One system instruction plus one user turn, answered as a JSON object
    pub fn json(
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            max_tokens,
            response_format: JsonObjectFormat {
                kind: "json_object",
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub total_tokens: u32,
}

/// Response body of `/chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// The first choice of a completion, flattened
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub total_tokens: u32,
    /// The model hit `max_tokens`; JSON output is likely cut off
    pub truncated: bool,
}

impl CompletionResponse {
    /// Flatten the first choice; `None` when there is no usable text
    pub fn into_completion(self) -> Option<Completion> {
        let choice = self.choices.into_iter().next()?;
        let text = choice.message.content.filter(|t| !t.trim().is_empty())?;
        Some(Completion {
            text,
            model: self.model,
            total_tokens: self.usage.map(|u| u.total_tokens).unwrap_or_default(),
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> CompletionResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_json_request_shape() {
        let request = CompletionRequest::json("gpt-4o-mini", "sys", "excerpt", 0.0, 2000);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "excerpt");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["max_tokens"], 2000);
    }

    #[test]
    fn test_into_completion() {
        let completion = response(
            r#"{
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "{\"entities\": []}"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }"#,
        )
        .into_completion()
        .unwrap();

        assert_eq!(completion.text, "{\"entities\": []}");
        assert_eq!(completion.total_tokens, 15);
        assert!(!completion.truncated);
    }

    #[test]
    fn test_length_finish_marks_truncated() {
        let completion = response(
            r#"{"model": "m", "choices": [{"message": {"role": "assistant", "content": "{\"enti"}, "finish_reason": "length"}]}"#,
        )
        .into_completion()
        .unwrap();
        assert!(completion.truncated);
        assert_eq!(completion.total_tokens, 0);
    }

    #[test]
    fn test_missing_or_blank_content_yields_none() {
        assert!(response(r#"{"model": "m", "choices": []}"#).into_completion().is_none());
        assert!(
            response(r#"{"model": "m", "choices": [{"message": {"role": "assistant", "content": null}}]}"#)
                .into_completion()
                .is_none()
        );
        assert!(
            response(r#"{"model": "m", "choices": [{"message": {"role": "assistant", "content": "  "}}]}"#)
                .into_completion()
                .is_none()
        );
    }
}
