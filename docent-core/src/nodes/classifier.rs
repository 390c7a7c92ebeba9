//! Question classification into a closed set of categories.

use crate::brain::Brain;
use crate::error::LlmError;
use crate::state::{AgentState, QuestionType};
use crate::types::Message;
use tracing::{debug, info};

const CLASSIFICATION_PROMPT: &str = r#"Classify this question into one of these categories:
- installation: Questions about installing, setting up, or getting started
- troubleshooting: Questions about fixing problems, errors, or issues
- feature: Questions about how to use specific features or functionality
- general: General questions that don't fit other categories

Question: {question}

Respond with only the category name (installation, troubleshooting, feature, or general)."#;

/// Map a model reply onto a category. Anything unrecognised becomes `General`.
pub fn parse_question_type(reply: &str) -> QuestionType {
    let cleaned = reply
        .trim()
        .to_lowercase()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string();

    if let Ok(question_type) = cleaned.parse::<QuestionType>() {
        return question_type;
    }

    // Tolerate wrappers like "Category: feature"
    cleaned
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| word.parse::<QuestionType>().ok())
        .unwrap_or(QuestionType::General)
}

/// Ask the model for a category and store it on the state.
pub async fn classify(brain: &Brain, state: &AgentState) -> Result<AgentState, LlmError> {
    let prompt = CLASSIFICATION_PROMPT.replace("{question}", &state.question);
    let reply = brain.complete_text(vec![Message::user(prompt)]).await?;
    let question_type = parse_question_type(&reply);

    debug!(reply = %reply.trim(), "Raw classification reply");
    info!(question_type = %question_type, "Question classified");

    Ok(state.with_step("classified", |s| s.question_type = Some(question_type)))
}
