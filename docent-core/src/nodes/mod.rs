//! Pipeline steps.
//!
//! Each step reads an `AgentState` and returns a new one. Steps that talk to
//! the model take a `&Brain` and surface provider failures as `LlmError`; the
//! graph attaches the step name.

pub mod answer;
pub mod classifier;
pub mod confidence;
pub mod reformulator;
pub mod retriever;
pub mod uncertainty;

pub use answer::answer;
pub use classifier::{classify, parse_question_type};
pub use confidence::{assess_confidence, parse_confidence};
pub use reformulator::{needs_reformulation, reformulate};
pub use retriever::{Document, Retriever, similarity};
pub use uncertainty::{UncertaintyAnalysis, UncertaintyResponder, parse_uncertainty_analysis};
