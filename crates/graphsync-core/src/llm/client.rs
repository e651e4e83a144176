//! HTTP client for an OpenAI-compatible chat completion endpoint

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client as HttpClient, StatusCode};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{Completion, CompletionRequest, CompletionResponse};

/// Attempts per completion, counting the first
const MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt
const RETRY_BASE: Duration = Duration::from_millis(500);

/// Upper bound on a server-suggested wait
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Chat completion client used by the LLM extractor
///
/// Retries rate limits and server errors a few times. Callers put their own
/// deadline around the whole call.
#[derive(Clone)]
pub struct LlmClient {
    http: HttpClient,
    config: LlmConfig,
    api_key: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

/// Failure of a single HTTP attempt
enum AttemptError {
    /// Worth another attempt after the given delay, if any
    Transient(Error, Option<Duration>),
    Fatal(Error),
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::LLMError("API key is required".to_string()));
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    /// Build a client with the key from `GRAPHSYNC_API_KEY` or `OPENAI_API_KEY`
    pub fn from_env(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                Error::LLMError(
                    "No API key found. Set GRAPHSYNC_API_KEY or OPENAI_API_KEY.".to_string(),
                )
            })?;
        Self::new(config, api_key)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Ask for a JSON object answer to one system + user exchange
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<Completion> {
        let request = CompletionRequest::json(
            &self.config.model,
            system,
            user,
            self.config.temperature,
            self.config.max_tokens,
        );

        let mut attempt = 1;
        loop {
            match self.attempt(&request).await {
                Ok(completion) => return Ok(completion),
                Err(AttemptError::Transient(err, hint)) if attempt < MAX_ATTEMPTS => {
                    let delay = retry_delay(attempt, hint);
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Completion request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Transient(err, _)) | Err(AttemptError::Fatal(err)) => {
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, request: &CompletionRequest) -> std::result::Result<Completion, AttemptError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        debug!(model = %request.model, "Sending completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AttemptError::Transient(Error::NetworkError(e), None)
                } else {
                    AttemptError::Fatal(Error::NetworkError(e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let hint = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            let err = error_for_status(status, hint, &body);
            return Err(if is_transient(status) {
                AttemptError::Transient(err, hint)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let body: CompletionResponse = response.json().await.map_err(|e| {
            AttemptError::Fatal(Error::LLMError(format!("Malformed completion response: {}", e)))
        })?;

        body.into_completion()
            .ok_or_else(|| AttemptError::Fatal(Error::LLMError("Completion had no content".to_string())))
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn error_for_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            Error::RateLimited(retry_after.map(|d| d.as_secs()).unwrap_or(0))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::LLMError(
            "Unauthorized: Invalid API key. Set GRAPHSYNC_API_KEY or OPENAI_API_KEY.".to_string(),
        ),
        StatusCode::NOT_FOUND => Error::LLMError(format!("Unknown model or endpoint: {}", body)),
        s => Error::LLMError(format!("HTTP {}: {}", s.as_u16(), body)),
    }
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn retry_delay(attempt: u32, hint: Option<Duration>) -> Duration {
    let backoff = RETRY_BASE * 2u32.pow(attempt.saturating_sub(1));
    match hint {
        Some(hint) => hint.min(MAX_RETRY_AFTER).max(backoff),
        None => backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        assert!(LlmClient::new(LlmConfig::default(), "  ").is_err());
        let client = LlmClient::new(LlmConfig::default(), "sk-test").unwrap();
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_debug_hides_key() {
        let client = LlmClient::new(LlmConfig::default(), "sk-secret").unwrap();
        assert!(!format!("{:?}", client).contains("sk-secret"));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_error_for_status() {
        let limited = error_for_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(7)), "");
        assert!(matches!(limited, Error::RateLimited(7)));
        assert!(limited.is_retryable());

        let auth = error_for_status(StatusCode::UNAUTHORIZED, None, "");
        assert!(auth.to_string().contains("GRAPHSYNC_API_KEY"));
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_retry_delay() {
        assert_eq!(retry_delay(1, None), Duration::from_millis(500));
        assert_eq!(retry_delay(2, None), Duration::from_secs(1));
        assert_eq!(retry_delay(1, Some(Duration::from_secs(5))), Duration::from_secs(5));
        assert_eq!(retry_delay(1, Some(Duration::from_secs(600))), MAX_RETRY_AFTER);
    }
}
