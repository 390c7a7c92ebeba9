//! OpenAI-compatible LLM provider.
//!
//! Supports OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio, and any
//! endpoint that follows the OpenAI chat completions API format.

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Wait used when a 429 carries no usable hint.
const DEFAULT_RATE_LIMIT_SECS: u64 = 5;

/// Body of a `POST /chat/completions` call.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// `{"error": {"message": ...}}`, the error envelope these servers share.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ChatResponse {
    fn into_completion(self, requested_model: &str) -> Result<CompletionResponse, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "response carried no choices".to_string(),
            })?;
        let usage = self
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            finish_reason: choice.finish_reason,
        })
    }
}

/// OpenAI-compatible LLM provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    attempt_timeout: Duration,
    retry: RetryConfig,
}

fn is_local_endpoint(base_url: &str) -> bool {
    base_url.contains("localhost") || base_url.contains("127.0.0.1")
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Reads the API key from the environment variable named by `config.api_key_env`.
    /// Local endpoints (localhost / 127.0.0.1) run without a key.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let from_env = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        let api_key = match from_env {
            Some(key) => key,
            None if config.base_url.as_deref().is_some_and(is_local_endpoint) => {
                debug!("No API key set for local endpoint; sending a placeholder");
                "local".to_string()
            }
            None => {
                return Err(LlmError::AuthFailed {
                    provider: format!(
                        "OpenAI-compatible: env var '{}' not set",
                        config.api_key_env
                    ),
                });
            }
        };
        Self::new_with_key(config, api_key)
    }

    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let attempt_timeout = config.attempt_timeout();
        let client = Client::builder()
            .timeout(attempt_timeout)
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            attempt_timeout,
            retry: config.retry.clone(),
        })
    }

    fn chat_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            stream: false,
            max_tokens: request.max_tokens,
        }
    }

    fn send_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                timeout_secs: self.attempt_timeout.as_secs(),
            }
        } else if err.is_connect() {
            LlmError::Connection {
                message: format!("Could not reach {}: {}", self.endpoint, err),
            }
        } else {
            LlmError::ApiRequest {
                message: format!("Request failed: {}", err),
            }
        }
    }

    async fn post_once(&self, body: &ChatRequest<'_>) -> Result<CompletionResponse, LlmError> {
        debug!(endpoint = %self.endpoint, model = %body.model, "POST chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| self.send_error(e))?;

        if !status.is_success() {
            return Err(status_error(status, &headers, &text));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::ResponseParse {
                message: format!("unexpected response body: {}", e),
            })?;
        parsed.into_completion(body.model)
    }
}

/// The server's own error message when the body is the usual envelope,
/// otherwise the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Seconds to wait after a 429: the `Retry-After` header, else a
/// "try again in 1.5s" phrase in the message, else a fixed default.
fn rate_limit_wait(headers: &HeaderMap, message: &str) -> u64 {
    let from_header = headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    let from_message = || {
        let (_, tail) = message.rsplit_once("try again in ")?;
        let amount = tail.split_whitespace().next()?;
        let secs: f64 = amount.trim_end_matches('.').trim_end_matches('s').parse().ok()?;
        Some(secs.ceil() as u64)
    };

    from_header
        .or_else(from_message)
        .unwrap_or(DEFAULT_RATE_LIMIT_SECS)
}

/// Classify a non-success status. 5xx is treated as a dropped connection so
/// it is retried.
fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> LlmError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            debug!(%status, %message, "Endpoint rejected the credentials");
            LlmError::AuthFailed {
                provider: "OpenAI-compatible".to_string(),
            }
        }
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            retry_after_secs: rate_limit_wait(headers, &message),
        },
        s if s.is_server_error() => LlmError::Connection {
            message: format!("server error {}: {}", s, message),
        },
        s => LlmError::ApiRequest {
            message: format!("HTTP {}: {}", s, message),
        },
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.chat_request(&request);
        let body = &body;
        super::with_retry(&self.retry, move || self.post_once(body)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn faq_config() -> LlmConfig {
        LlmConfig {
            model: "gpt-4o-mini".to_string(),
            api_key_env: "DOCENT_TEST_OPENAI_KEY".to_string(),
            ..LlmConfig::default()
        }
    }

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new_with_key(&faq_config(), "sk-test".into()).unwrap()
    }

    #[test]
    fn test_chat_request_serializes_prompt() {
        let provider = provider();
        let request = CompletionRequest {
            messages: vec![
                Message::system("Answer only from the FAQ."),
                Message::user("Rate the confidence for: How do I install?"),
            ],
            temperature: 0.0,
            max_tokens: Some(64),
            model: None,
        };
        let body = serde_json::to_value(provider.chat_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(
            body["messages"][1]["content"],
            "Rate the confidence for: How do I install?"
        );
    }

    #[test]
    fn test_chat_request_model_override_and_no_max_tokens() {
        let provider = provider();
        let request = CompletionRequest {
            model: Some("gpt-4o".into()),
            ..CompletionRequest::default()
        };
        let body = serde_json::to_value(provider.chat_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_scorer_reply_is_parsed() {
        let raw = r#"{
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{
                "message": {"role": "assistant", "content": "Score: 9\nReason: The install section answers it."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 212, "completion_tokens": 14, "total_tokens": 226}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let resp = parsed.into_completion("gpt-4o-mini").unwrap();
        assert!(resp.text().starts_with("Score: 9"));
        assert_eq!(resp.usage.input_tokens, 212);
        assert_eq!(resp.usage.total(), 226);
        assert_eq!(resp.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_local_server_reply_without_usage_or_model() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let resp = parsed.into_completion("llama3.1:8b").unwrap();
        assert_eq!(resp.text(), "");
        assert_eq!(resp.model, "llama3.1:8b");
        assert_eq!(resp.usage, TokenUsage::default());
    }

    #[test]
    fn test_empty_choices_is_a_parse_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            parsed.into_completion("gpt-4o-mini"),
            Err(LlmError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_rejected_key() {
        let err = status_error(
            StatusCode::UNAUTHORIZED,
            &HeaderMap::new(),
            r#"{"error": {"message": "Incorrect API key provided"}}"#,
        );
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_rate_limit_prefers_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        let err = status_error(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            r#"{"error": {"message": "Rate limit reached. Please try again in 20s."}}"#,
        );
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after_secs: 12
            }
        ));
    }

    #[test]
    fn test_rate_limit_wait_from_message() {
        let message = "Rate limit reached for gpt-4o-mini. Please try again in 1.5s. Visit the docs.";
        assert_eq!(rate_limit_wait(&HeaderMap::new(), message), 2);
        assert_eq!(
            rate_limit_wait(&HeaderMap::new(), "slow down"),
            DEFAULT_RATE_LIMIT_SECS
        );
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = status_error(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            "upstream unavailable",
        );
        assert!(err.is_transient());
        assert!(err.to_string().contains("502"));

        let err = status_error(
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            r#"{"error": {"message": "model 'gpt-9' does not exist"}}"#,
        );
        match err {
            LlmError::ApiRequest { message } => assert!(message.contains("gpt-9")),
            other => panic!("Expected ApiRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_for_hosted_endpoint() {
        let config = LlmConfig {
            api_key_env: "DOCENT_TEST_OPENAI_KEY_MISSING".to_string(),
            ..faq_config()
        };
        assert!(matches!(
            OpenAiCompatibleProvider::new(&config),
            Err(LlmError::AuthFailed { .. })
        ));
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let config = LlmConfig {
            api_key_env: "DOCENT_TEST_LOCAL_KEY_UNSET".to_string(),
            base_url: Some("http://localhost:11434/v1/".to_string()),
            ..faq_config()
        };
        let provider = OpenAiCompatibleProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434/v1/chat/completions");
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_reported_in_seconds() {
        // Accepts connections but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = LlmConfig {
            api_key_env: "DOCENT_TEST_LOCAL_KEY_UNSET".to_string(),
            base_url: Some(format!("http://{}/v1", listener.local_addr().unwrap())),
            timeout_secs: 1,
            retry: RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
            ..faq_config()
        };
        let provider = OpenAiCompatibleProvider::new(&config).unwrap();
        let err = provider
            .complete(CompletionRequest {
                messages: vec![Message::user("How do I install?")],
                ..CompletionRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { timeout_secs: 1 }));
        drop(listener);
    }
}
