//! Uncertainty responder.
//!
//! One component produces every non-direct answer. A prioritized rule list
//! picks a [`ResponseStrategy`], and a fixed template renders it:
//!
//! 1. harmful keyword -> `HarmfulContent`
//! 2. empty or too-short question -> `Clarification`
//! 3. off-topic keyword -> `OffTopic`
//! 4. score at or below the refusal threshold -> `LowConfidence`
//! 5. anything else -> `PartialAnswer`
//!
//! [`UncertaintyResponder::fallback`] applies the rules as-is and never calls
//! the model. [`UncertaintyResponder::handle_uncertainty`] applies rules 1-3,
//! then asks the model once to classify the kind of uncertainty and lets its
//! recommendation replace rules 4-5.

use crate::brain::Brain;
use crate::config::RoutingConfig;
use crate::error::LlmError;
use crate::screening::{ScreeningPolicy, ScreeningVerdict};
use crate::state::{AgentState, ResponseStrategy, UncertaintyType};
use crate::types::Message;
use tracing::{info, warn};

const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert at analyzing uncertainty in Q&A systems.";

const ANALYSIS_PROMPT: &str = r#"Analyze this Q&A scenario for uncertainty and appropriateness:

Question: {question}
Retrieved Context: {context}
Confidence Score: {confidence_score}

Determine:
1. Is this question within the scope of a FAQ system about this software project?
2. Is there sufficient context to answer confidently?
3. What type of uncertainty exists (if any)?

Respond in this format:
Scope: [in_scope/out_of_scope]
Sufficiency: [sufficient/insufficient/partial]
Uncertainty Type: [none/out_of_scope/insufficient/conflicting/ambiguous/low_retrieval/partial]
Recommended Strategy: [explicit_refusal/clarification/partial_answer/scope_redirect/suggest_alternatives]
Explanation: [brief explanation of your assessment]"#;

const NO_CONTEXT: &str = "No context retrieved.";

const HARMFUL_TEMPLATE: &str = "I can't provide assistance with activities that could be harmful or illegal.

If you're interested in security topics, legitimate options include:
• Learning through established educational platforms
• Taking part in capture-the-flag (CTF) competitions
• Studying for recognised security certifications

Is there something about this project I can help you with instead?";

const INCOMPLETE_TEMPLATE: &str = "I'd be happy to help! However, your question seems incomplete.

I can assist with this project, including:
• Installation and setup
• Understanding how the pipeline and its nodes work
• Troubleshooting common issues
• Learning about project features

Could you please provide more details about what you'd like to know?";

const AMBIGUOUS_TEMPLATE: &str = "Your question \"{question}\" could be interpreted in several ways.
To give you the most helpful answer, could you clarify:

• Which specific aspect are you most interested in?
• Are you looking for installation steps, usage examples, or troubleshooting help?
• What have you already tried, if anything?";

const OFF_TOPIC_TEMPLATE: &str = "I don't have information about that topic. I'm specialized in helping with this project.

For questions about \"{question}\", you might want to try:
• General search engines for broad topics
• Specialized forums or communities
• Official documentation for the specific tool or service

Is there anything about this project I can help you with?";

const LOW_CONFIDENCE_TEMPLATE: &str = "I don't have reliable information to answer your question confidently.

This could be because:
• Your question might be outside what this project's documentation covers
• The available documentation doesn't cover this specific topic
• Your question might need clarification

For the best results, you might want to:
• Check the project's repository for detailed documentation
• Browse the example code and test files
• Ask the maintainers directly in the issue tracker";

const INSUFFICIENT_TEMPLATE: &str = "I don't have enough reliable information to answer your question confidently.

The available documentation doesn't contain enough information to answer \"{question}\" properly.

To get accurate information, you might want to:
• Check the project's repository for more detailed documentation
• Look for examples in the codebase or test files
• Ask the maintainers directly in the issue tracker";

const REFUSAL_TEMPLATE: &str = "I don't have enough reliable information to answer your question confidently.

While I found some potentially relevant information, I cannot give a confident answer to \"{question}\" based on the current knowledge base.

For the most accurate information, please refer to the official documentation or contact the project maintainers.";

const MEDIUM_CONFIDENCE_TEMPLATE: &str = "I found some relevant information, but I'm not confident enough to provide a complete answer.

To get accurate information about your question, I recommend:
• Consulting the project's official documentation
• Looking at example implementations in the codebase
• Checking recent discussions in the issue tracker

Do you have a related question I might be able to answer more confidently?";

const PARTIAL_TEMPLATE: &str = "I can provide some relevant information about \"{question}\", but my knowledge is limited:

{snippet}

Important limitations:
• This information may be incomplete
• The documentation might not cover all aspects of your question
• For comprehensive guidance, please consult additional resources";

const ALTERNATIVES_TEMPLATE: &str = "I don't have specific information about \"{question}\", but here are some related topics I can help with:

Installation & Setup:
• How to install the project
• Setting up your development environment
• Configuration requirements

Usage:
• Creating and wiring pipeline nodes
• Building question-answering workflows
• Understanding the project architecture

Troubleshooting:
• Common installation issues
• Debugging workflows
• Performance considerations

Would any of these topics be helpful?";

/// Fields parsed from the model's uncertainty analysis. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UncertaintyAnalysis {
    pub scope: Option<String>,
    pub sufficiency: Option<String>,
    pub uncertainty_type: Option<UncertaintyType>,
    pub strategy: Option<ResponseStrategy>,
    pub explanation: Option<String>,
}

impl UncertaintyAnalysis {
    pub fn is_out_of_scope(&self) -> bool {
        self.scope
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("out_of_scope"))
            || self.uncertainty_type == Some(UncertaintyType::OutOfScope)
    }
}

/// Parse labelled lines out of an analysis reply. Missing lines stay `None`;
/// an unknown strategy name is dropped so the caller's default applies.
pub fn parse_uncertainty_analysis(reply: &str) -> UncertaintyAnalysis {
    let mut analysis = UncertaintyAnalysis::default();

    for line in reply.lines().map(str::trim) {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match label.trim().to_lowercase().as_str() {
            "scope" => analysis.scope = Some(value.to_lowercase()),
            "sufficiency" => analysis.sufficiency = Some(value.to_lowercase()),
            "uncertainty type" => {
                analysis.uncertainty_type = Some(UncertaintyType::parse_lenient(value))
            }
            "recommended strategy" => analysis.strategy = value.parse().ok(),
            "explanation" => analysis.explanation = Some(value.to_string()),
            _ => {}
        }
    }

    analysis
}

/// Produces refusals, redirects, and hedged answers from fixed templates.
#[derive(Debug, Clone, Default)]
pub struct UncertaintyResponder {
    screening: ScreeningPolicy,
    routing: RoutingConfig,
}

impl UncertaintyResponder {
    pub fn new(screening: ScreeningPolicy, routing: RoutingConfig) -> Self {
        Self { screening, routing }
    }

    pub fn screening(&self) -> &ScreeningPolicy {
        &self.screening
    }

    /// Rules 1-3: content policy on the question alone.
    fn policy_rule(&self, question: &str) -> Option<(ResponseStrategy, String)> {
        self.screening
            .screen(question)
            .map(|verdict| (verdict.strategy, verdict.explanation))
    }

    /// Pick a strategy with the full rule list.
    pub fn select_strategy(&self, state: &AgentState) -> (ResponseStrategy, String) {
        if let Some(rule) = self.policy_rule(&state.question) {
            return rule;
        }

        let score = state.effective_score();
        if score <= self.routing.refusal_threshold {
            (
                ResponseStrategy::LowConfidence,
                format!(
                    "Confidence score {} is at or below the refusal threshold {}",
                    score, self.routing.refusal_threshold
                ),
            )
        } else {
            (
                ResponseStrategy::PartialAnswer,
                format!(
                    "Confidence score {} is too low for a direct answer",
                    score
                ),
            )
        }
    }

    /// Fill the template for `strategy`. `uncertainty` is set only on the
    /// analysed path and selects the more specific wording.
    pub fn render(
        &self,
        strategy: ResponseStrategy,
        state: &AgentState,
        uncertainty: Option<UncertaintyType>,
    ) -> String {
        let question = state.question.trim();
        let template = match strategy {
            ResponseStrategy::HarmfulContent => HARMFUL_TEMPLATE,
            ResponseStrategy::Clarification if self.screening.is_vague(question) => {
                INCOMPLETE_TEMPLATE
            }
            ResponseStrategy::Clarification => AMBIGUOUS_TEMPLATE,
            ResponseStrategy::OffTopic => OFF_TOPIC_TEMPLATE,
            ResponseStrategy::SuggestAlternatives => ALTERNATIVES_TEMPLATE,
            ResponseStrategy::PartialAnswer => match (uncertainty, top_snippet(state)) {
                (Some(_), Some(snippet)) => {
                    return PARTIAL_TEMPLATE
                        .replace("{question}", question)
                        .replace("{snippet}", snippet);
                }
                _ => MEDIUM_CONFIDENCE_TEMPLATE,
            },
            ResponseStrategy::LowConfidence | ResponseStrategy::Direct => match uncertainty {
                None => LOW_CONFIDENCE_TEMPLATE,
                Some(UncertaintyType::Insufficient) => INSUFFICIENT_TEMPLATE,
                Some(UncertaintyType::OutOfScope) => OFF_TOPIC_TEMPLATE,
                Some(_) => REFUSAL_TEMPLATE,
            },
        };
        template.replace("{question}", question)
    }

    fn finish(
        &self,
        state: &AgentState,
        step: &str,
        strategy: ResponseStrategy,
        explanation: String,
        uncertainty: Option<UncertaintyType>,
    ) -> AgentState {
        let answer = self.render(strategy, state, uncertainty);
        info!(
            step,
            strategy = %strategy,
            explanation = %explanation,
            "Fallback response generated"
        );
        state.with_step(step, |s| {
            s.answer = Some(answer);
            s.is_fallback_response = true;
            s.response_strategy = Some(strategy);
            s.response_explanation = Some(explanation);
            if uncertainty.is_some() {
                s.uncertainty_type = uncertainty;
            }
        })
    }

    /// Answer a question that was stopped before entering the pipeline.
    pub fn pre_screened(&self, state: &AgentState, verdict: &ScreeningVerdict) -> AgentState {
        self.finish(
            state,
            "pre_screened",
            verdict.strategy,
            verdict.explanation.clone(),
            None,
        )
    }

    /// Template-only fallback. Never calls the model.
    pub fn fallback(&self, state: &AgentState) -> AgentState {
        let (strategy, explanation) = self.select_strategy(state);
        self.finish(state, "fallback", strategy, explanation, None)
    }

    /// Analysed fallback: policy rules first, then one model call to classify
    /// the uncertainty before choosing a template.
    pub async fn handle_uncertainty(
        &self,
        brain: &Brain,
        state: &AgentState,
    ) -> Result<AgentState, LlmError> {
        if let Some((strategy, explanation)) = self.policy_rule(&state.question) {
            let uncertainty = match strategy {
                ResponseStrategy::Clarification => Some(UncertaintyType::Ambiguous),
                ResponseStrategy::OffTopic => Some(UncertaintyType::OutOfScope),
                _ => None,
            };
            return Ok(self.finish(
                state,
                "uncertainty_handled",
                strategy,
                explanation,
                uncertainty,
            ));
        }

        let prompt = ANALYSIS_PROMPT
            .replace("{question}", &state.question)
            .replace("{context}", &state.joined_context(NO_CONTEXT))
            .replace("{confidence_score}", &state.effective_score().to_string());
        let reply = brain
            .complete_text(vec![
                Message::system(ANALYSIS_SYSTEM_PROMPT),
                Message::user(prompt),
            ])
            .await?;
        let analysis = parse_uncertainty_analysis(&reply);

        let strategy = match analysis.strategy {
            _ if analysis.is_out_of_scope() => ResponseStrategy::OffTopic,
            Some(recommended) if recommended.is_fallback() => recommended,
            _ => {
                warn!("Uncertainty analysis gave no usable strategy; refusing explicitly");
                ResponseStrategy::LowConfidence
            }
        };

        let uncertainty = analysis
            .uncertainty_type
            .unwrap_or(UncertaintyType::Unknown);
        let explanation = match analysis.explanation {
            Some(text) => format!("Uncertainty analysis ({}): {}", uncertainty, text),
            None => format!(
                "Uncertainty analysis reported {} at confidence {}",
                uncertainty,
                state.effective_score()
            ),
        };

        Ok(self.finish(
            state,
            "uncertainty_handled",
            strategy,
            explanation,
            Some(uncertainty),
        ))
    }
}

fn top_snippet(state: &AgentState) -> Option<&str> {
    state
        .context
        .first()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}
