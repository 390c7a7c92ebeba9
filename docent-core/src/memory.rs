//! Per-session conversation memory.
//!
//! A `ConversationMemory` is owned by whoever drives a session (the `chat`
//! command) and lent to each graph run. Nothing here is global.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Exchanges shown in the rendered history.
const RENDERED_EXCHANGES: usize = 3;
/// Answers are cut to this many characters when rendered.
const ANSWER_PREVIEW_CHARS: usize = 100;

/// One question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded history of the most recent exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMemory {
    exchanges: VecDeque<Exchange>,
    max_history: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ConversationMemory {
    pub fn new(max_history: usize) -> Self {
        Self {
            exchanges: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    /// Record an exchange, evicting the oldest one past `max_history`.
    pub fn add_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.exchanges.push_back(Exchange {
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        });
        while self.exchanges.len() > self.max_history {
            self.exchanges.pop_front();
        }
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    /// Prompt-ready summary of the last few exchanges.
    pub fn render_context(&self) -> String {
        if self.exchanges.is_empty() {
            return "No previous conversation.".to_string();
        }

        let skip = self.exchanges.len().saturating_sub(RENDERED_EXCHANGES);
        let mut lines = vec!["Previous conversation:".to_string()];
        for (i, exchange) in self.exchanges.iter().skip(skip).enumerate() {
            lines.push(format!("{}. Q: {}", i + 1, exchange.question));
            lines.push(format!("   A: {}", preview(&exchange.answer)));
        }
        lines.join("\n")
    }
}

fn preview(answer: &str) -> String {
    if answer.chars().count() <= ANSWER_PREVIEW_CHARS {
        answer.to_string()
    } else {
        let cut: String = answer.chars().take(ANSWER_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}
