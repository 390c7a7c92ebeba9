//! The normal answer path.

use crate::brain::Brain;
use crate::error::LlmError;
use crate::state::{AgentState, ResponseStrategy};
use crate::types::Message;
use tracing::info;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers product FAQ questions.
Use the provided context snippets from the knowledge base.
Quote directly from the context when possible and keep answers concise.
If the answer is not present in the context, acknowledge the gap.";

const NO_CONTEXT: &str = "No relevant context provided.";

fn user_prompt(state: &AgentState) -> String {
    let mut prompt = format!(
        "Question: {}\n\nContext:\n{}",
        state.question,
        state.joined_context(NO_CONTEXT)
    );
    if let Some(history) = state.conversation_history.as_deref().filter(|h| !h.is_empty()) {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(history);
    }
    prompt
}

/// Generate the final answer from the question and retrieved context.
pub async fn answer(brain: &Brain, state: &AgentState) -> Result<AgentState, LlmError> {
    let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(user_prompt(state))];
    let reply = brain.complete_text(messages).await?;

    info!(answer_length = reply.len(), "Answer generated");

    Ok(state.with_step("answered", |s| {
        s.answer = Some(reply);
        s.response_strategy = Some(ResponseStrategy::Direct);
        s.is_fallback_response = false;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::LlmConfig;
    use crate::types::Role;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_answer_sets_direct_strategy() {
        let mock = Arc::new(MockLlmProvider::with_response("Run `pip install agent`."));
        let brain = Brain::new(mock.clone(), &LlmConfig::default());
        let state = AgentState::new("How do I install?").update(|s| {
            s.context = vec!["first".into(), "second".into()];
            s.citations = vec!["a".into(), "b".into()];
        });

        let result = answer(&brain, &state).await.unwrap();
        assert_eq!(result.answer.as_deref(), Some("Run `pip install agent`."));
        assert_eq!(result.response_strategy, Some(ResponseStrategy::Direct));
        assert!(!result.is_fallback_response);
        assert_eq!(result.processing_steps, vec!["answered"]);

        let request = &mock.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        let prompt = request.last_user_text().unwrap();
        assert!(prompt.contains("Context:\nfirst\n\nsecond"));
    }

    #[tokio::test]
    async fn test_answer_without_context_uses_placeholder() {
        let mock = Arc::new(MockLlmProvider::with_response("I don't know."));
        let brain = Brain::new(mock.clone(), &LlmConfig::default());
        answer(&brain, &AgentState::new("q?")).await.unwrap();
        let prompt = mock.requests()[0].last_user_text().unwrap().to_string();
        assert!(prompt.contains("No relevant context provided."));
        assert!(!prompt.contains("Conversation so far"));
    }

    #[tokio::test]
    async fn test_answer_includes_history() {
        let mock = Arc::new(MockLlmProvider::with_response("ok"));
        let brain = Brain::new(mock.clone(), &LlmConfig::default());
        let state = AgentState::new("And on Windows?")
            .update(|s| s.conversation_history = Some("Q: How do I install?".into()));
        answer(&brain, &state).await.unwrap();
        let prompt = mock.requests()[0].last_user_text().unwrap().to_string();
        assert!(prompt.contains("Conversation so far:\nQ: How do I install?"));
    }
}
