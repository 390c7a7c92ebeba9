//! Confidence scoring: how well does the retrieved context answer the question?

use crate::brain::Brain;
use crate::config::RoutingConfig;
use crate::error::LlmError;
use crate::state::{AgentState, ConfidenceScore};
use crate::types::Message;
use tracing::{info, warn};

const CONFIDENCE_PROMPT: &str = r#"Analyze how well the provided context answers the user's question.

Question: {question}

Context:
{context}

Rate the confidence on a scale of 1-10 where:
- 1-3: The context doesn't contain relevant information
- 4-6: The context partially answers the question but lacks details
- 7-8: The context mostly answers the question with minor gaps
- 9-10: The context completely and clearly answers the question

Also provide a brief reason for your confidence score.

Respond in this exact format:
Score: [number]
Reason: [brief explanation]"#;

const NO_CONTEXT: &str = "No context provided.";

/// Reason recorded when the reply has no usable `Reason:` line.
pub const UNPARSED_REASON: &str = "Unable to parse confidence assessment";

/// Read an integer score from the text after `Score:`. Only the first word
/// counts, and only a trailing `/10` or `.` is tolerated on it.
fn parse_score(value: &str) -> Option<ConfidenceScore> {
    let token = value.split_whitespace().next()?;
    let token = token
        .strip_suffix("/10")
        .or_else(|| token.strip_suffix('.'))
        .unwrap_or(token);
    token.parse::<i64>().ok().map(ConfidenceScore::new)
}

/// Extract the score and reason from a scorer reply.
///
/// Missing or non-integer scores fall back to [`ConfidenceScore::DEFAULT`];
/// integers outside 1-10 are clamped. This never fails.
pub fn parse_confidence(reply: &str) -> (ConfidenceScore, String) {
    let mut score = None;
    let mut reason = None;

    for line in reply.lines().map(str::trim_start) {
        if let Some(rest) = line.strip_prefix("Score:") {
            score = parse_score(rest);
        } else if let Some(rest) = line.strip_prefix("Reason:") {
            let rest = rest.trim();
            if !rest.is_empty() {
                reason = Some(rest.to_string());
            }
        }
    }

    (
        score.unwrap_or(ConfidenceScore::DEFAULT),
        reason.unwrap_or_else(|| UNPARSED_REASON.to_string()),
    )
}

/// Rate the retrieved context and set `needs_clarification` from the score.
pub async fn assess_confidence(
    brain: &Brain,
    state: &AgentState,
    routing: &RoutingConfig,
) -> Result<AgentState, LlmError> {
    let prompt = CONFIDENCE_PROMPT
        .replace("{question}", &state.question)
        .replace("{context}", &state.joined_context(NO_CONTEXT));
    let reply = brain.complete_text(vec![Message::user(prompt)]).await?;
    let (score, reason) = parse_confidence(&reply);

    if reason == UNPARSED_REASON {
        warn!(reply = %reply.trim(), "Confidence reply did not follow the expected format");
    }

    let needs_clarification = score.value() <= routing.clarification_threshold;
    info!(
        score = score.value(),
        needs_clarification,
        "Confidence assessed"
    );

    Ok(state.with_step("confidence_assessed", |s| {
        s.confidence_score = Some(score);
        s.confidence_reason = Some(reason);
        s.needs_clarification = needs_clarification;
    }))
}
