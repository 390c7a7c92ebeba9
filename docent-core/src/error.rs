//! Error types for the Docent core.
//!
//! Uses `thiserror` for public API error types. Malformed model output is never
//! an error here: parsers recover with documented defaults, so the only fatal
//! condition for a pipeline run is the text-generation service itself failing.

/// Top-level error type for the Docent core library.
#[derive(Debug, thiserror::Error)]
pub enum DocentError {
    #[error("Text-generation service unavailable during '{step}': {source}")]
    ServiceUnavailable {
        step: String,
        #[source]
        source: LlmError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DocentError {
    /// Wrap a provider failure with the name of the pipeline step that hit it.
    pub fn service_unavailable(step: impl Into<String>, source: LlmError) -> Self {
        DocentError::ServiceUnavailable {
            step: step.into(),
            source,
        }
    }
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl LlmError {
    /// Whether another attempt could succeed. Auth, parse and 4xx failures are final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
        )
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `DocentError`.
pub type Result<T> = std::result::Result<T, DocentError>;
