//! # Docent Core
//!
//! Core library for the Docent documentation assistant.
//! Provides the per-question state record, the pipeline steps, the graph
//! orchestrator, the text-generation interface (brain), providers,
//! pre-screening, conversation memory, configuration, and error types.

pub mod brain;
pub mod config;
pub mod error;
pub mod graph;
pub mod memory;
pub mod nodes;
pub mod providers;
pub mod screening;
pub mod state;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use config::{DocentConfig, LlmConfig, RetrievalConfig, RoutingConfig};
pub use error::{ConfigError, DocentError, LlmError, Result};
pub use graph::{FaqGraph, FaqGraphBuilder, GraphVariant, RunTrace, Step};
pub use memory::ConversationMemory;
pub use nodes::{Document, Retriever, UncertaintyResponder};
pub use providers::create_provider;
pub use screening::{ScreeningPolicy, ScreeningVerdict};
pub use state::{AgentState, ConfidenceScore, QuestionType, ResponseStrategy, UncertaintyType};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
