//! Similarity-based retrieval over an in-memory document set.

use crate::state::AgentState;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::debug;

/// Default number of snippets kept on the state.
pub const DEFAULT_TOP_K: usize = 3;

/// A source document: its text and a stable identifier used as the citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub source: String,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }
}

/// Ratio of matching characters between two strings, in [0, 1], compared case-insensitively.
pub fn similarity(question: &str, content: &str) -> f32 {
    let q = question.to_lowercase();
    let c = content.to_lowercase();
    TextDiff::from_chars(q.as_str(), c.as_str()).ratio()
}

/// Ranks documents against the question and keeps the top `k`.
#[derive(Debug, Clone)]
pub struct Retriever {
    documents: Vec<Document>,
    top_k: usize,
}

impl Retriever {
    pub fn new(documents: Vec<Document>, top_k: usize) -> Self {
        Self { documents, top_k }
    }

    /// Documents ordered by descending similarity. Ties keep input order.
    pub fn rank(&self, question: &str) -> Vec<(&Document, f32)> {
        let mut scored: Vec<(&Document, f32)> = self
            .documents
            .iter()
            .map(|doc| (doc, similarity(question, &doc.content)))
            .collect();
        // sort_by is stable
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }

    /// Set `context` and `citations` from the top-ranked documents.
    pub fn retrieve(&self, state: &AgentState) -> AgentState {
        let chosen: Vec<(&Document, f32)> = self
            .rank(&state.question)
            .into_iter()
            .take(self.top_k)
            .collect();

        debug!(
            candidates = self.documents.len(),
            kept = chosen.len(),
            best_score = chosen.first().map(|(_, s)| *s).unwrap_or(0.0),
            "Ranked documents"
        );

        state.with_step("retrieved", |s| {
            s.context = chosen.iter().map(|(d, _)| d.content.clone()).collect();
            s.citations = chosen.iter().map(|(d, _)| d.source.clone()).collect();
        })
    }
}
