//! Configuration system for Docent.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment. CLI flags are
//! applied by the caller on the extracted value.
//!
//! Files are read from `~/.config/docent/config.toml` and/or
//! `.docent/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::graph::GraphVariant;
use crate::screening::ScreeningPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocentConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub routing: RoutingConfig,
    pub screening: ScreeningPolicy,
    pub graph: GraphConfig,
    pub memory: MemoryConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name. Only OpenAI-compatible endpoints are built in.
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override (Ollama, vLLM, LM Studio, Azure...).
    pub base_url: Option<String>,
    /// Sampling temperature. Zero keeps classification and scoring stable.
    pub temperature: f32,
    /// Maximum tokens to generate per call.
    pub max_tokens: Option<usize>,
    /// Timeout for a single HTTP attempt, in seconds. The whole call, retries
    /// included, is bounded by [`LlmConfig::call_deadline`].
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Timeout applied to each HTTP attempt.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Upper bound for one completion call: every attempt may run to its own
    /// timeout, plus the longest possible sleep between attempts.
    pub fn call_deadline(&self) -> Duration {
        self.attempt_timeout() * (self.retry.max_retries + 1) + self.retry.max_total_backoff()
    }
}

/// Exponential backoff for transient provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (zero-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let grown = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(grown.min(self.max_backoff_ms as f64) as u64)
    }

    /// Largest delay `base` can become once jitter (up to a quarter more) is added.
    pub fn jittered_ceiling(&self, base: Duration) -> Duration {
        if self.jitter { base + base / 4 } else { base }
    }

    /// Total sleep across all retries in the worst case. Rate-limit hints
    /// longer than this are cut short by the call deadline.
    pub fn max_total_backoff(&self) -> Duration {
        (0..self.max_retries)
            .map(|attempt| self.jittered_ceiling(self.base_delay(attempt)))
            .sum()
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of snippets kept on the state after ranking.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Confidence thresholds that drive branching. All values are on the 1-10 scale
/// and are compared with `<=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// `needs_clarification` is set at or below this score.
    pub clarification_threshold: u8,
    /// The fallback responder refuses outright at or below this score.
    pub refusal_threshold: u8,
    /// Intelligent graph: always handle uncertainty at or below this score.
    pub very_low_confidence: u8,
    /// Intelligent graph: handle uncertainty at or below this score.
    pub low_confidence: u8,
    /// Intelligent graph: scores above `low_confidence` up to this one go to fallback.
    pub medium_confidence: u8,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            clarification_threshold: 4,
            refusal_threshold: 3,
            very_low_confidence: 2,
            low_confidence: 4,
            medium_confidence: 7,
        }
    }
}

/// Which graph wiring to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub variant: GraphVariant,
}

/// Per-session conversation memory settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of exchanges retained by a session store.
    pub max_history: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_history: 5 }
    }
}

impl DocentConfig {
    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid {
                message: "retrieval.top_k must be at least 1".to_string(),
            });
        }

        let thresholds = [
            ("clarification_threshold", self.routing.clarification_threshold),
            ("refusal_threshold", self.routing.refusal_threshold),
            ("very_low_confidence", self.routing.very_low_confidence),
            ("low_confidence", self.routing.low_confidence),
            ("medium_confidence", self.routing.medium_confidence),
        ];
        for (name, value) in thresholds {
            if !(1..=10).contains(&value) {
                return Err(ConfigError::Invalid {
                    message: format!("routing.{} must be within 1-10, got {}", name, value),
                });
            }
        }

        if self.routing.low_confidence > self.routing.medium_confidence {
            return Err(ConfigError::Invalid {
                message: format!(
                    "routing.low_confidence ({}) exceeds routing.medium_confidence ({})",
                    self.routing.low_confidence, self.routing.medium_confidence
                ),
            });
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "llm.model".to_string(),
            });
        }

        Ok(())
    }
}

fn user_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("dev", "docent", "docent")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from all layers and validate it.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<DocentConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DocentConfig::default()));

    // User-level config
    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".docent").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Explicit file must exist if one was named
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Invalid {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (DOCENT_LLM__MODEL, DOCENT_RETRIEVAL__TOP_K, etc.)
    figment = figment.merge(Env::prefixed("DOCENT_").split("__"));

    let config: DocentConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Whether a user-level or workspace-level configuration file is present.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".docent").join("config.toml").exists())
}
