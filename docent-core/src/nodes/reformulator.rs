//! Query reformulation for vague questions.

use crate::brain::Brain;
use crate::error::LlmError;
use crate::state::AgentState;
use crate::types::Message;
use tracing::info;

const REFORMULATION_PROMPT: &str = r#"You are helping to reformulate user questions to be clearer and more specific for a FAQ system about a software project.

Original question: {question}

If the question is already clear and specific, return it unchanged.
If the question is vague, unclear, or uses ambiguous terms, reformulate it to be more specific.

Examples:
- "How do I use this?" -> "How do I install and run the FAQ assistant?"
- "It's broken" -> "What are common troubleshooting steps when the agent doesn't work?"
- "What about nodes?" -> "How do I add custom nodes to the agent graph?"

Return only the reformulated question, nothing else."#;

/// Reference words that carry no meaning without surrounding context.
const UNCLEAR_REFERENCES: &[&str] = &["this", "it", "that", "here", "there"];

/// Ultra-short questions that are vague as a whole.
const VAGUE_PHRASES: &[&str] = &[
    "help",
    "how?",
    "what?",
    "why?",
    "how do i use this?",
    "what is this?",
];

/// Lead-ins that mark a question as clear; any of these suppresses reformulation.
const CLEAR_PATTERNS: &[&str] = &[
    "what is",
    "how does",
    "where is",
    "when does",
    "why does",
    "can i",
    "should i",
    "will it",
    "is there",
];

/// Whether the question should be rewritten before classification and retrieval.
pub fn needs_reformulation(question: &str) -> bool {
    let lower = question.trim().to_lowercase();

    let has_unclear_refs = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| UNCLEAR_REFERENCES.contains(&word));
    let is_very_vague = VAGUE_PHRASES.contains(&lower.as_str());
    let is_clear_question = CLEAR_PATTERNS.iter().any(|p| lower.contains(p));

    (has_unclear_refs || is_very_vague) && !is_clear_question
}

/// Rewrite the question when it is vague; otherwise record it as the original unchanged.
pub async fn reformulate(brain: &Brain, state: &AgentState) -> Result<AgentState, LlmError> {
    if !needs_reformulation(&state.question) {
        info!("Question is clear, no reformulation needed");
        return Ok(state.update(|s| {
            s.original_question = Some(s.question.clone());
            s.was_reformulated = false;
        }));
    }

    let prompt = REFORMULATION_PROMPT.replace("{question}", &state.question);
    let rewritten = brain.complete_text(vec![Message::user(prompt)]).await?;
    let rewritten = rewritten.trim();

    if rewritten.is_empty() {
        info!("Reformulation returned nothing; keeping the original question");
        return Ok(state.update(|s| {
            s.original_question = Some(s.question.clone());
            s.was_reformulated = false;
        }));
    }

    info!(
        original_length = state.question.len(),
        reformulated_length = rewritten.len(),
        "Question reformulated"
    );

    Ok(state.with_step("reformulated", |s| {
        s.original_question = Some(s.question.clone());
        s.question = rewritten.to_string();
        s.was_reformulated = true;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::LlmConfig;
    use std::sync::Arc;

    #[test]
    fn test_needs_reformulation_cases() {
        let cases = [
            ("What is quantum computing?", false),
            ("How do I use this?", true),
            ("How do I install the agent?", false),
            ("It's broken", true),
            ("What about nodes?", false),
            ("Help", true),
            ("Where is the documentation?", false),
            ("Can I use custom models?", false),
            ("That doesn't work", true),
            ("What is this?", false),
        ];
        for (question, expected) in cases {
            assert_eq!(needs_reformulation(question), expected, "{}", question);
        }
    }

    #[test]
    fn test_reference_words_match_whole_words_only() {
        // "with", "edit" and "the" contain reference words as substrings only
        assert!(!needs_reformulation("How do I edit the config with vim"));
    }

    #[tokio::test]
    async fn test_clear_question_is_unchanged() {
        let mock = Arc::new(MockLlmProvider::new());
        let brain = Brain::new(mock.clone(), &LlmConfig::default());
        let state = AgentState::new("How do I install the agent?");

        let result = reformulate(&brain, &state).await.unwrap();
        assert!(!result.was_reformulated);
        assert_eq!(result.question, "How do I install the agent?");
        assert_eq!(
            result.original_question.as_deref(),
            Some("How do I install the agent?")
        );
        assert!(result.processing_steps.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_vague_question_is_rewritten() {
        let mock = Arc::new(MockLlmProvider::with_response(
            "  How do I install and run the FAQ assistant?\n",
        ));
        let brain = Brain::new(mock.clone(), &LlmConfig::default());
        let state = AgentState::new("How do I use this?");

        let result = reformulate(&brain, &state).await.unwrap();
        assert!(result.was_reformulated);
        assert_eq!(result.question, "How do I install and run the FAQ assistant?");
        assert_eq!(result.original_question.as_deref(), Some("How do I use this?"));
        assert_eq!(result.processing_steps, vec!["reformulated"]);
        assert_eq!(mock.call_count(), 1);
        let prompt = mock.requests()[0].last_user_text().unwrap().to_string();
        assert!(prompt.contains("Original question: How do I use this?"));
        // Input snapshot untouched
        assert_eq!(state.question, "How do I use this?");
    }

    #[tokio::test]
    async fn test_empty_rewrite_keeps_question() {
        let mock = Arc::new(MockLlmProvider::with_response("   "));
        let brain = Brain::new(mock, &LlmConfig::default());
        let result = reformulate(&brain, &AgentState::new("It's broken"))
            .await
            .unwrap();
        assert!(!result.was_reformulated);
        assert_eq!(result.question, "It's broken");
    }
}
