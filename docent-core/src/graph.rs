//! Graph orchestrator.
//!
//! Wires the pipeline steps into one of three fixed graphs and walks it for a
//! single question. Every graph is acyclic and ends at a terminal step
//! (`Answer`, `Fallback`, or `HandleUncertainty`), so a run performs a bounded
//! number of model calls.
//!
//! ```text
//! basic:        retrieve -> answer
//! enhanced:     reformulate -> classify -> retrieve -> assess_confidence
//!                 -> answer | fallback
//! intelligent:  reformulate -> classify -> retrieve -> assess_confidence
//!                 -> answer | fallback | handle_uncertainty
//! ```
//!
//! Before the first step the question is screened. A harmful, empty, or
//! off-topic question is answered from a template without calling the model.

use crate::brain::{Brain, LlmProvider};
use crate::config::{DocentConfig, RoutingConfig};
use crate::error::{DocentError, Result};
use crate::memory::ConversationMemory;
use crate::nodes::{self, Document, Retriever, UncertaintyResponder};
use crate::state::AgentState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

/// Which wiring to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphVariant {
    /// Retrieve then answer. No scoring, no fallback.
    Basic,
    /// Full prefix with a clarification-driven fallback branch.
    #[default]
    Enhanced,
    /// Full prefix with the extra uncertainty-analysis branch.
    Intelligent,
}

impl GraphVariant {
    pub const ALL: [GraphVariant; 3] = [
        GraphVariant::Basic,
        GraphVariant::Enhanced,
        GraphVariant::Intelligent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphVariant::Basic => "basic",
            GraphVariant::Enhanced => "enhanced",
            GraphVariant::Intelligent => "intelligent",
        }
    }
}

impl fmt::Display for GraphVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        GraphVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown graph variant '{}' (expected basic, enhanced or intelligent)",
                    s
                )
            })
    }
}

/// A node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Reformulate,
    Classify,
    Retrieve,
    AssessConfidence,
    Answer,
    Fallback,
    HandleUncertainty,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Reformulate => "reformulate",
            Step::Classify => "classify",
            Step::Retrieve => "retrieve",
            Step::AssessConfidence => "assess_confidence",
            Step::Answer => "answer",
            Step::Fallback => "fallback",
            Step::HandleUncertainty => "handle_uncertainty",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Answer | Step::Fallback | Step::HandleUncertainty)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every snapshot produced by one run.
#[derive(Debug, Clone)]
pub struct RunTrace {
    pub run_id: Uuid,
    /// State after each executed step, in order. Empty when the question was
    /// answered by pre-screening.
    pub steps: Vec<(Step, AgentState)>,
    pub final_state: AgentState,
}

impl RunTrace {
    /// Names of the executed steps.
    pub fn path(&self) -> Vec<Step> {
        self.steps.iter().map(|(step, _)| *step).collect()
    }
}

/// Builder for [`FaqGraph`].
pub struct FaqGraphBuilder {
    provider: Arc<dyn LlmProvider>,
    documents: Vec<Document>,
    variant: Option<GraphVariant>,
    config: DocentConfig,
}

impl FaqGraphBuilder {
    pub fn documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }

    /// Override `config.graph.variant`.
    pub fn variant(mut self, variant: GraphVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn config(mut self, config: DocentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FaqGraph {
        let config = self.config;
        FaqGraph {
            brain: Brain::new(self.provider, &config.llm),
            retriever: Retriever::new(self.documents, config.retrieval.top_k),
            responder: UncertaintyResponder::new(config.screening, config.routing.clone()),
            routing: config.routing,
            variant: self.variant.unwrap_or(config.graph.variant),
        }
    }
}

/// A compiled question-answering graph.
pub struct FaqGraph {
    brain: Brain,
    retriever: Retriever,
    responder: UncertaintyResponder,
    routing: RoutingConfig,
    variant: GraphVariant,
}

impl FaqGraph {
    pub fn builder(provider: Arc<dyn LlmProvider>) -> FaqGraphBuilder {
        FaqGraphBuilder {
            provider,
            documents: Vec::new(),
            variant: None,
            config: DocentConfig::default(),
        }
    }

    pub fn variant(&self) -> GraphVariant {
        self.variant
    }

    pub fn entry_step(&self) -> Step {
        match self.variant {
            GraphVariant::Basic => Step::Retrieve,
            GraphVariant::Enhanced | GraphVariant::Intelligent => Step::Reformulate,
        }
    }

    /// Successor of `step` given the state it produced. `None` after a terminal.
    pub fn next_step(&self, step: Step, state: &AgentState) -> Option<Step> {
        match step {
            Step::Reformulate => Some(Step::Classify),
            Step::Classify => Some(Step::Retrieve),
            Step::Retrieve => match self.variant {
                GraphVariant::Basic => Some(Step::Answer),
                GraphVariant::Enhanced | GraphVariant::Intelligent => Some(Step::AssessConfidence),
            },
            Step::AssessConfidence => Some(self.route_after_confidence(state)),
            Step::Answer | Step::Fallback | Step::HandleUncertainty => None,
        }
    }

    fn route_after_confidence(&self, state: &AgentState) -> Step {
        match self.variant {
            GraphVariant::Basic => Step::Answer,
            GraphVariant::Enhanced => {
                if state.needs_clarification {
                    Step::Fallback
                } else {
                    Step::Answer
                }
            }
            GraphVariant::Intelligent => {
                let score = state.effective_score();
                if self.should_handle_uncertainty(state) {
                    Step::HandleUncertainty
                } else if score > self.routing.low_confidence
                    && score <= self.routing.medium_confidence
                {
                    Step::Fallback
                } else {
                    Step::Answer
                }
            }
        }
    }

    /// Whether the intelligent graph should take the uncertainty branch.
    pub fn should_handle_uncertainty(&self, state: &AgentState) -> bool {
        let score = state.effective_score();
        let screening = self.responder.screening();

        score <= self.routing.very_low_confidence
            || state.has_blank_context()
            || screening.is_vague(&state.question)
            || score <= self.routing.low_confidence
            || screening.off_topic_match(&state.question).is_some()
    }

    async fn execute(&self, step: Step, state: &AgentState) -> Result<AgentState> {
        let unavailable = |e| DocentError::service_unavailable(step.name(), e);
        match step {
            Step::Reformulate => nodes::reformulate(&self.brain, state)
                .await
                .map_err(unavailable),
            Step::Classify => nodes::classify(&self.brain, state)
                .await
                .map_err(unavailable),
            Step::Retrieve => Ok(self.retriever.retrieve(state)),
            Step::AssessConfidence => nodes::assess_confidence(&self.brain, state, &self.routing)
                .await
                .map_err(unavailable),
            Step::Answer => nodes::answer(&self.brain, state)
                .await
                .map_err(unavailable),
            Step::Fallback => Ok(self.responder.fallback(state)),
            Step::HandleUncertainty => self
                .responder
                .handle_uncertainty(&self.brain, state)
                .await
                .map_err(unavailable),
        }
    }

    /// Run one question and keep every intermediate snapshot.
    pub async fn run_steps(
        &self,
        question: &str,
        memory: Option<&ConversationMemory>,
    ) -> Result<RunTrace> {
        let run_id = Uuid::new_v4();
        let mut state = AgentState::new(question);
        if let Some(memory) = memory.filter(|m| !m.is_empty()) {
            state.conversation_history = Some(memory.render_context());
        }

        info!(
            run_id = %run_id,
            variant = %self.variant,
            model = %self.brain.model_name(),
            "Starting run"
        );

        if let Some(verdict) = self.responder.screening().screen(question) {
            info!(
                run_id = %run_id,
                strategy = %verdict.strategy,
                "Question stopped by pre-screening"
            );
            return Ok(RunTrace {
                run_id,
                steps: Vec::new(),
                final_state: self.responder.pre_screened(&state, &verdict),
            });
        }

        let mut steps = Vec::new();
        let mut current = Some(self.entry_step());
        while let Some(step) = current {
            let span = info_span!("graph_step", run_id = %run_id, step = step.name());
            state = self.execute(step, &state).instrument(span).await?;
            debug!(step = step.name(), "Step complete");
            steps.push((step, state.clone()));
            current = self.next_step(step, &state);
        }

        info!(
            run_id = %run_id,
            steps = steps.len(),
            fallback = state.is_fallback_response,
            "Run complete"
        );

        Ok(RunTrace {
            run_id,
            steps,
            final_state: state,
        })
    }

    /// Run one question and return the final state.
    pub async fn run(
        &self,
        question: &str,
        memory: Option<&ConversationMemory>,
    ) -> Result<AgentState> {
        Ok(self.run_steps(question, memory).await?.final_state)
    }
}
