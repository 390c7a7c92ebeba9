//! Brain module: the text-generation boundary.
//!
//! Defines the `LlmProvider` trait every step talks to, the `Brain` wrapper that
//! applies sampling settings and the call deadline, and a scriptable
//! `MockLlmProvider` for tests.

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for text-generation providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Wraps a provider with the call settings every pipeline step shares.
#[derive(Clone)]
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: Option<usize>,
    deadline: Duration,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            deadline: config.call_deadline(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Send prompt messages and return the generated text.
    ///
    /// The deadline spans the provider's own retries. A call that outlives it
    /// is reported as `LlmError::Timeout`, like any other provider failure.
    pub async fn complete_text(&self, messages: Vec<Message>) -> Result<String, LlmError> {
        let request = CompletionRequest {
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: None,
        };

        debug!(
            model = %self.provider.model_name(),
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = tokio::time::timeout(self.deadline, self.provider.complete(request))
            .await
            .map_err(|_| {
                warn!(
                    deadline_secs = self.deadline.as_secs(),
                    "Completion request missed its deadline"
                );
                LlmError::Timeout {
                    timeout_secs: self.deadline.as_secs(),
                }
            })??;

        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            total_tokens = response.usage.total(),
            "Completion received"
        );
        Ok(response.message.content)
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// A mock LLM provider for testing.
///
/// Replies come from, in order: the queue of scripted replies, the responder
/// closure if one is set, and finally a fixed default text. Every request is
/// recorded so tests can assert how many calls were made and what they said.
pub struct MockLlmProvider {
    model: String,
    default_reply: String,
    queued: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            default_reply: "I'm a mock LLM. No queued responses available.".to_string(),
            queued: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that answers every call with the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            default_reply: text.to_string(),
            ..Self::new()
        }
    }

    /// Create a MockLlmProvider whose reply is computed from the request.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue a reply for the next `complete` call.
    pub fn queue_response(&self, text: &str) {
        self.queued.lock().unwrap().push_back(Ok(text.to_string()));
    }

    /// Queue a failure for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.queued.lock().unwrap().push_back(Err(error));
    }

    /// Number of completion calls received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let queued = self.queued.lock().unwrap().pop_front();
        let reply = match queued {
            Some(reply) => reply,
            None => match &self.responder {
                Some(responder) => responder(&request),
                None => Ok(self.default_reply.clone()),
            },
        };
        self.requests.lock().unwrap().push(request);
        reply.map(|text| MockLlmProvider::text_response(&text))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
