//! LLM provider implementations.
//!
//! Only OpenAI-compatible chat-completions endpoints are built in (OpenAI,
//! Azure, Ollama, vLLM, LM Studio). Use `create_provider()` to instantiate one
//! from configuration.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use openai_compat::OpenAiCompatibleProvider;

/// Run `operation` until it succeeds, fails permanently, or the retry budget
/// in `config` is spent.
///
/// Only [`LlmError::is_transient`] failures are retried. A rate-limit hint
/// from the server stretches the wait when it is longer than the backoff.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut retries_used = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_transient() || retries_used == config.max_retries {
            return Err(err);
        }

        let wait = retry_delay(config, retries_used, &err);
        tracing::warn!(
            retry = retries_used + 1,
            of = config.max_retries,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "Transient provider error; retrying"
        );
        tokio::time::sleep(wait).await;
        retries_used += 1;
    }
}

/// Wait before the next attempt: the jittered backoff, or the server's
/// `retry_after` hint when that is longer.
fn retry_delay(config: &RetryConfig, retries_used: u32, err: &LlmError) -> Duration {
    let base = config.base_delay(retries_used);
    let backoff = if config.jitter {
        base + jitter(config.jittered_ceiling(base) - base)
    } else {
        base
    };
    match err {
        LlmError::RateLimited { retry_after_secs } => {
            backoff.max(Duration::from_secs(*retry_after_secs))
        }
        _ => backoff,
    }
}

/// A pseudo-random slice of `spread`, seeded from the clock's sub-second part.
fn jitter(spread: Duration) -> Duration {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    spread.mul_f64(f64::from(nanos % 1_000) / 1_000.0)
}

/// Create an LLM provider based on the configuration.
///
/// Every provider name maps to the OpenAI-compatible client; unknown names are
/// logged and treated as OpenAI-compatible endpoints.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "openai" | "azure" | "ollama" | "vllm" | "lmstudio" | "local" => {}
        other => tracing::warn!(
            provider = %other,
            "Unknown provider name; treating it as an OpenAI-compatible endpoint"
        ),
    }
    Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
}
