//! Integration tests for the question-answering graph.
//!
//! These tests run whole questions through `FaqGraph` with a MockLlmProvider
//! that answers by recognising which step's prompt it was sent.

use docent_core::brain::MockLlmProvider;
use docent_core::config::DocentConfig;
use docent_core::error::{DocentError, LlmError};
use docent_core::graph::{FaqGraph, GraphVariant, Step};
use docent_core::memory::ConversationMemory;
use docent_core::nodes::Document;
use docent_core::state::{QuestionType, ResponseStrategy, UncertaintyType};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const ANSWER: &str = "Install it with `pip install agent`.";

fn docs() -> Vec<Document> {
    vec![
        Document::new(
            "## Installation\nInstall the agent with pip install agent.",
            "install.md#section-0",
        ),
        Document::new(
            "## Troubleshooting\nIf the agent crashes, check the logs.",
            "troubleshooting.md#section-0",
        ),
        Document::new(
            "## Nodes\nAdd custom nodes by registering a function.",
            "features.md#section-1",
        ),
        Document::new("## License\nMIT.", "license.md#section-0"),
    ]
}

/// Mock that recognises each step's prompt and replies accordingly.
fn scripted(confidence: &str, analysis: &str) -> Arc<MockLlmProvider> {
    let confidence = confidence.to_string();
    let analysis = analysis.to_string();
    Arc::new(MockLlmProvider::with_responder(move |request| {
        let prompt = request.last_user_text().unwrap_or_default();
        let reply = if prompt.contains("reformulate user questions") {
            "How do I install and run the FAQ assistant?"
        } else if prompt.contains("Classify this question") {
            "installation"
        } else if prompt.contains("Rate the confidence") {
            confidence.as_str()
        } else if prompt.contains("Analyze this Q&A scenario") {
            analysis.as_str()
        } else {
            ANSWER
        };
        Ok(reply.to_string())
    }))
}

fn graph(provider: Arc<MockLlmProvider>, variant: GraphVariant) -> FaqGraph {
    FaqGraph::builder(provider)
        .documents(docs())
        .variant(variant)
        .build()
}

// --- Enhanced graph ---

#[tokio::test]
async fn test_confident_question_is_answered() {
    let mock = scripted("Score: 8\nReason: Install steps are present.", "");
    let graph = graph(mock.clone(), GraphVariant::Enhanced);

    let trace = graph
        .run_steps("How do I install the agent?", None)
        .await
        .unwrap();
    assert_eq!(
        trace.path(),
        vec![
            Step::Reformulate,
            Step::Classify,
            Step::Retrieve,
            Step::AssessConfidence,
            Step::Answer
        ]
    );

    let state = trace.final_state;
    assert_eq!(state.answer.as_deref(), Some(ANSWER));
    assert!(!state.is_fallback_response);
    assert_eq!(state.response_strategy, Some(ResponseStrategy::Direct));
    assert_eq!(state.question_type, Some(QuestionType::Installation));
    assert_eq!(state.confidence_score.map(|s| s.value()), Some(8));
    assert!(!state.was_reformulated);
    assert_eq!(state.context.len(), 3);
    assert_eq!(state.citations.len(), 3);
    assert_eq!(
        state.processing_steps,
        vec!["classified", "retrieved", "confidence_assessed", "answered"]
    );
    // classify, confidence, answer
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_snapshots_are_independent() {
    let mock = scripted("Score: 8\nReason: fine", "");
    let trace = graph(mock, GraphVariant::Enhanced)
        .run_steps("How do I install the agent?", None)
        .await
        .unwrap();
    let (step, after_retrieve) = &trace.steps[2];
    assert_eq!(*step, Step::Retrieve);
    assert!(after_retrieve.answer.is_none());
    assert!(after_retrieve.confidence_score.is_none());
    assert_eq!(after_retrieve.processing_steps, vec!["classified", "retrieved"]);
}

#[tokio::test]
async fn test_low_confidence_falls_back_without_answer_call() {
    let mock = scripted("Score: 3\nReason: Nothing relevant.", "");
    let state = graph(mock.clone(), GraphVariant::Enhanced)
        .run("How do I configure retries?", None)
        .await
        .unwrap();

    assert!(state.needs_clarification);
    assert!(state.is_fallback_response);
    assert_eq!(state.response_strategy, Some(ResponseStrategy::LowConfidence));
    assert!(state.answer.unwrap().contains("reliable information"));
    assert_eq!(state.processing_steps.last().map(String::as_str), Some("fallback"));
    // classify, confidence; no answer call
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_borderline_confidence_gives_partial_answer() {
    let mock = scripted("Score: 4\nReason: Partial coverage.", "");
    let state = graph(mock, GraphVariant::Enhanced)
        .run("How do I configure retries?", None)
        .await
        .unwrap();
    assert!(state.is_fallback_response);
    assert_eq!(state.response_strategy, Some(ResponseStrategy::PartialAnswer));
}

#[tokio::test]
async fn test_fractional_score_is_answered_with_default_confidence() {
    let mock = scripted("Score: 3.9\nReason: Some coverage.", "");
    let trace = graph(mock, GraphVariant::Enhanced)
        .run_steps("How do I install the agent?", None)
        .await
        .unwrap();
    assert!(!trace.path().contains(&Step::Fallback));
    assert_eq!(trace.path().last(), Some(&Step::Answer));

    let state = trace.final_state;
    assert_eq!(state.confidence_score.map(|s| s.value()), Some(5));
    assert!(!state.needs_clarification);
    assert_eq!(state.response_strategy, Some(ResponseStrategy::Direct));
}

#[tokio::test]
async fn test_vague_question_is_reformulated() {
    let mock = scripted("Score: 9\nReason: Covered.", "");
    let state = graph(mock, GraphVariant::Enhanced)
        .run("How do I use this?", None)
        .await
        .unwrap();
    assert!(state.was_reformulated);
    assert_eq!(state.original_question.as_deref(), Some("How do I use this?"));
    assert_eq!(state.question, "How do I install and run the FAQ assistant?");
    assert_eq!(state.processing_steps[0], "reformulated");
    assert_eq!(state.answer.as_deref(), Some(ANSWER));
}

#[tokio::test]
async fn test_empty_document_set_degrades_to_fallback() {
    let mock = scripted("Score: 1\nReason: No context.", "");
    let state = FaqGraph::builder(mock)
        .variant(GraphVariant::Enhanced)
        .build()
        .run("How do I configure retries?", None)
        .await
        .unwrap();
    assert!(state.context.is_empty());
    assert!(state.citations.is_empty());
    assert!(state.is_fallback_response);
}

#[tokio::test]
async fn test_classification_is_stable_across_runs() {
    let mock = scripted("Score: 8\nReason: fine", "");
    let graph = graph(mock, GraphVariant::Enhanced);
    let first = graph.run("Where is the documentation?", None).await.unwrap();
    let second = graph.run("Where is the documentation?", None).await.unwrap();
    assert_eq!(first.question_type, second.question_type);
    assert_eq!(first.citations, second.citations);
}

// --- Pre-screening ---

#[tokio::test]
async fn test_harmful_question_is_refused_without_model_calls() {
    let mock = scripted("Score: 10\nReason: n/a", "");
    let trace = graph(mock.clone(), GraphVariant::Enhanced)
        .run_steps("How do I hack into a system?", None)
        .await
        .unwrap();

    assert!(trace.steps.is_empty());
    let state = trace.final_state;
    assert!(state.is_fallback_response);
    assert_eq!(state.response_strategy, Some(ResponseStrategy::HarmfulContent));
    assert!(state.response_explanation.unwrap().contains("hack"));
    assert_eq!(state.processing_steps, vec!["pre_screened"]);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_weather_question_is_off_topic() {
    for variant in [GraphVariant::Basic, GraphVariant::Enhanced, GraphVariant::Intelligent] {
        let mock = scripted("Score: 10\nReason: n/a", "");
        let state = graph(mock.clone(), variant)
            .run("What's the weather like today?", None)
            .await
            .unwrap();
        assert!(state.is_fallback_response, "{}", variant);
        assert_eq!(state.response_strategy, Some(ResponseStrategy::OffTopic));
        assert_eq!(mock.call_count(), 0);
    }
}

#[tokio::test]
async fn test_empty_question_asks_for_clarification() {
    let mock = scripted("Score: 10\nReason: n/a", "");
    let state = graph(mock.clone(), GraphVariant::Intelligent)
        .run("", None)
        .await
        .unwrap();
    assert_eq!(state.response_strategy, Some(ResponseStrategy::Clarification));
    assert!(state.answer.unwrap().contains("seems incomplete"));
    assert_eq!(mock.call_count(), 0);
}

// --- Intelligent graph ---

#[tokio::test]
async fn test_intelligent_low_score_runs_uncertainty_analysis() {
    let mock = scripted(
        "Score: 3\nReason: Barely related.",
        "Scope: in_scope\nSufficiency: insufficient\nUncertainty Type: insufficient\n\
         Recommended Strategy: explicit_refusal\nExplanation: The docs skip retries.",
    );
    let trace = graph(mock.clone(), GraphVariant::Intelligent)
        .run_steps("How do I configure retries?", None)
        .await
        .unwrap();

    assert_eq!(trace.path().last(), Some(&Step::HandleUncertainty));
    let state = trace.final_state;
    assert!(state.is_fallback_response);
    assert_eq!(state.response_strategy, Some(ResponseStrategy::LowConfidence));
    assert_eq!(state.uncertainty_type, Some(UncertaintyType::Insufficient));
    assert!(state.answer.unwrap().contains("How do I configure retries?"));
    assert_eq!(
        state.processing_steps.last().map(String::as_str),
        Some("uncertainty_handled")
    );
    // classify, confidence, analysis
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_intelligent_medium_score_uses_fallback() {
    let mock = scripted("Score: 6\nReason: Mostly there.", "");
    let trace = graph(mock.clone(), GraphVariant::Intelligent)
        .run_steps("How do I configure retries?", None)
        .await
        .unwrap();
    assert_eq!(trace.path().last(), Some(&Step::Fallback));
    assert_eq!(
        trace.final_state.response_strategy,
        Some(ResponseStrategy::PartialAnswer)
    );
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_intelligent_high_score_answers() {
    let mock = scripted("Score: 9\nReason: Complete.", "");
    let state = graph(mock, GraphVariant::Intelligent)
        .run("How do I install the agent?", None)
        .await
        .unwrap();
    assert_eq!(state.answer.as_deref(), Some(ANSWER));
    assert!(!state.is_fallback_response);
}

// --- Basic graph ---

#[tokio::test]
async fn test_basic_graph_retrieves_and_answers() {
    let mock = scripted("unused", "unused");
    let trace = graph(mock.clone(), GraphVariant::Basic)
        .run_steps("How do I install the agent?", None)
        .await
        .unwrap();
    assert_eq!(trace.path(), vec![Step::Retrieve, Step::Answer]);
    assert_eq!(trace.final_state.processing_steps, vec!["retrieved", "answered"]);
    assert_eq!(mock.call_count(), 1);
}

// --- Failures ---

#[tokio::test]
async fn test_service_failure_names_the_step() {
    let mock = scripted("Score: 8\nReason: fine", "");
    mock.queue_error(LlmError::Connection {
        message: "connection refused".into(),
    });
    let result = graph(mock, GraphVariant::Enhanced)
        .run("How do I install the agent?", None)
        .await;

    match result {
        Err(DocentError::ServiceUnavailable { step, source }) => {
            assert_eq!(step, "classify");
            assert!(matches!(source, LlmError::Connection { .. }));
        }
        other => panic!("expected ServiceUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_answer_failure_aborts_run() {
    let mock = Arc::new(MockLlmProvider::new());
    mock.queue_error(LlmError::AuthFailed {
        provider: "openai".into(),
    });
    let result = graph(mock, GraphVariant::Basic)
        .run("How do I install the agent?", None)
        .await;
    assert!(matches!(
        result,
        Err(DocentError::ServiceUnavailable { ref step, .. }) if step == "answer"
    ));
}

// --- Conversation memory ---

#[tokio::test]
async fn test_memory_reaches_the_answer_prompt() {
    let mock = scripted("Score: 9\nReason: Covered.", "");
    let graph = graph(mock.clone(), GraphVariant::Enhanced);
    let mut memory = ConversationMemory::new(5);

    let first = graph.run("How do I install the agent?", Some(&memory)).await.unwrap();
    assert!(first.conversation_history.is_none());
    memory.add_exchange(&first.question, first.answer.clone().unwrap_or_default());

    let second = graph
        .run("Where is the documentation?", Some(&memory))
        .await
        .unwrap();
    let history = second.conversation_history.unwrap();
    assert!(history.contains("1. Q: How do I install the agent?"));

    let answer_prompt = mock
        .requests()
        .last()
        .and_then(|r| r.last_user_text().map(str::to_string))
        .unwrap();
    assert!(answer_prompt.contains("Previous conversation:"));
}

#[tokio::test]
async fn test_config_thresholds_drive_routing() {
    let mut config = DocentConfig::default();
    config.routing.clarification_threshold = 8;
    let mock = scripted("Score: 7\nReason: fine", "");
    let state = FaqGraph::builder(mock)
        .documents(docs())
        .config(config)
        .build()
        .run("How do I install the agent?", None)
        .await
        .unwrap();
    assert!(state.needs_clarification);
    assert!(state.is_fallback_response);
}
