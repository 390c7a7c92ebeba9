//! The per-request state record threaded through every pipeline step.
//!
//! Steps never mutate the state they are given. Each one derives a new value
//! with [`AgentState::update`], so a snapshot taken at any point stays valid and
//! `processing_steps` is an honest audit trail.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Installation,
    Troubleshooting,
    Feature,
    General,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] = [
        QuestionType::Installation,
        QuestionType::Troubleshooting,
        QuestionType::Feature,
        QuestionType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Installation => "installation",
            QuestionType::Troubleshooting => "troubleshooting",
            QuestionType::Feature => "feature",
            QuestionType::General => "general",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

/// How the final answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    /// Normal answer path.
    Direct,
    /// Refusal for harmful requests.
    HarmfulContent,
    /// Request for a clearer question.
    Clarification,
    /// Scope explanation plus redirect.
    OffTopic,
    /// Explicit "no reliable information" response.
    LowConfidence,
    /// Softer "found something, not confident" response.
    PartialAnswer,
    /// Related topics the assistant can cover.
    SuggestAlternatives,
}

impl ResponseStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStrategy::Direct => "direct",
            ResponseStrategy::HarmfulContent => "harmful_content",
            ResponseStrategy::Clarification => "clarification",
            ResponseStrategy::OffTopic => "off_topic",
            ResponseStrategy::LowConfidence => "low_confidence",
            ResponseStrategy::PartialAnswer => "partial_answer",
            ResponseStrategy::SuggestAlternatives => "suggest_alternatives",
        }
    }

    /// True for every strategy except the normal answer path.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ResponseStrategy::Direct)
    }
}

impl fmt::Display for ResponseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts both our own names and the names used in the uncertainty-analysis prompt.
impl FromStr for ResponseStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(ResponseStrategy::Direct),
            "harmful_content" => Ok(ResponseStrategy::HarmfulContent),
            "clarification" => Ok(ResponseStrategy::Clarification),
            "off_topic" | "scope_redirect" => Ok(ResponseStrategy::OffTopic),
            "low_confidence" | "explicit_refusal" => Ok(ResponseStrategy::LowConfidence),
            "partial_answer" => Ok(ResponseStrategy::PartialAnswer),
            "suggest_alternatives" => Ok(ResponseStrategy::SuggestAlternatives),
            _ => Err(()),
        }
    }
}

/// Kind of uncertainty reported by the uncertainty analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyType {
    None,
    OutOfScope,
    Insufficient,
    Conflicting,
    Ambiguous,
    LowRetrieval,
    Partial,
    Unknown,
}

impl UncertaintyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyType::None => "none",
            UncertaintyType::OutOfScope => "out_of_scope",
            UncertaintyType::Insufficient => "insufficient",
            UncertaintyType::Conflicting => "conflicting",
            UncertaintyType::Ambiguous => "ambiguous",
            UncertaintyType::LowRetrieval => "low_retrieval",
            UncertaintyType::Partial => "partial",
            UncertaintyType::Unknown => "unknown",
        }
    }

    /// Parse a label, mapping anything unrecognised to `Unknown`.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "none" => UncertaintyType::None,
            "out_of_scope" => UncertaintyType::OutOfScope,
            "insufficient" => UncertaintyType::Insufficient,
            "conflicting" => UncertaintyType::Conflicting,
            "ambiguous" => UncertaintyType::Ambiguous,
            "low_retrieval" => UncertaintyType::LowRetrieval,
            "partial" => UncertaintyType::Partial,
            _ => UncertaintyType::Unknown,
        }
    }
}

impl fmt::Display for UncertaintyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence rating on the 1-10 scale. Construction clamps, so a stored value
/// is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct ConfidenceScore(u8);

impl ConfidenceScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;
    /// Used whenever the scorer's output cannot be parsed.
    pub const DEFAULT: ConfidenceScore = ConfidenceScore(5);

    pub fn new(value: i64) -> Self {
        ConfidenceScore(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ConfidenceScore {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(ConfidenceScore(value as u8))
        } else {
            Err(format!("confidence score {} outside 1-10", value))
        }
    }
}

impl From<ConfidenceScore> for u8 {
    fn from(score: ConfidenceScore) -> Self {
        score.0
    }
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State shared between graph steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub question: String,
    pub original_question: Option<String>,
    /// Retrieved snippets in rank order.
    pub context: Vec<String>,
    /// Source ids, index-aligned with `context`.
    pub citations: Vec<String>,
    pub answer: Option<String>,

    pub confidence_score: Option<ConfidenceScore>,
    pub confidence_reason: Option<String>,
    pub needs_clarification: bool,
    pub uncertainty_type: Option<UncertaintyType>,

    pub question_type: Option<QuestionType>,
    pub was_reformulated: bool,

    pub is_fallback_response: bool,
    pub response_strategy: Option<ResponseStrategy>,
    pub response_explanation: Option<String>,

    pub conversation_history: Option<String>,
    pub processing_steps: Vec<String>,
}

impl AgentState {
    /// A fresh state with only the question populated.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Derive a new state from this one plus a field diff. `self` is left untouched.
    pub fn update(&self, diff: impl FnOnce(&mut AgentState)) -> AgentState {
        let mut next = self.clone();
        diff(&mut next);
        next
    }

    /// Derive a new state with `step` appended to the audit trail.
    pub fn with_step(&self, step: &str, diff: impl FnOnce(&mut AgentState)) -> AgentState {
        self.update(|s| {
            diff(s);
            s.processing_steps.push(step.to_string());
        })
    }

    /// Score used for routing: the assessed score, or the parser default when absent.
    pub fn effective_score(&self) -> u8 {
        self.confidence_score
            .unwrap_or(ConfidenceScore::DEFAULT)
            .value()
    }

    /// Context joined for prompting, or `placeholder` when nothing was retrieved.
    pub fn joined_context(&self, placeholder: &str) -> String {
        if self.context.is_empty() {
            placeholder.to_string()
        } else {
            self.context.join("\n\n")
        }
    }

    /// True when no snippet carries any text.
    pub fn has_blank_context(&self) -> bool {
        self.context.iter().all(|c| c.trim().is_empty())
    }
}
