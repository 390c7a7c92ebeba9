//! Pre-screening of incoming questions.
//!
//! Holds the one authoritative keyword policy for harmful, vague, and
//! off-topic questions. The graph runs it once before the first step so a
//! refusal or redirect never costs a model call; the fallback responder reuses
//! the same policy when it picks a strategy.

use crate::state::ResponseStrategy;
use serde::{Deserialize, Serialize};

const DEFAULT_HARMFUL: &[&str] = &[
    "hack", "crack", "exploit", "attack", "malware", "virus", "steal", "fraud", "scam",
    "illegal", "bomb", "weapon", "hurt", "kill", "suicide", "self-harm",
];

const DEFAULT_OFF_TOPIC: &[&str] = &[
    "weather",
    "cooking",
    "sports",
    "politics",
    "medicine",
    "quantum",
    "physics",
    "chemistry",
    "biology",
    "law",
    "finance",
    "astronomy",
];

/// Keyword lists and limits used to screen questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningPolicy {
    pub harmful_keywords: Vec<String>,
    pub off_topic_keywords: Vec<String>,
    /// Questions shorter than this (after trimming) are treated as too vague.
    pub min_question_chars: usize,
}

impl Default for ScreeningPolicy {
    fn default() -> Self {
        Self {
            harmful_keywords: DEFAULT_HARMFUL.iter().map(|s| s.to_string()).collect(),
            off_topic_keywords: DEFAULT_OFF_TOPIC.iter().map(|s| s.to_string()).collect(),
            min_question_chars: 3,
        }
    }
}

/// Why a question was stopped before entering the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreeningVerdict {
    pub strategy: ResponseStrategy,
    /// The keyword that triggered the verdict, if any.
    pub matched: Option<String>,
    pub explanation: String,
}

impl ScreeningPolicy {
    /// First harmful keyword found in the question.
    pub fn harmful_match(&self, question: &str) -> Option<&str> {
        find_keyword(&self.harmful_keywords, question)
    }

    /// First off-topic keyword found in the question.
    pub fn off_topic_match(&self, question: &str) -> Option<&str> {
        find_keyword(&self.off_topic_keywords, question)
    }

    /// Empty or near-empty after trimming.
    pub fn is_vague(&self, question: &str) -> bool {
        question.trim().chars().count() < self.min_question_chars
    }

    /// Screen a question: harmful, then vague, then off-topic.
    pub fn screen(&self, question: &str) -> Option<ScreeningVerdict> {
        if let Some(keyword) = self.harmful_match(question) {
            return Some(ScreeningVerdict {
                strategy: ResponseStrategy::HarmfulContent,
                matched: Some(keyword.to_string()),
                explanation: format!(
                    "Question matched the harmful-content keyword '{}'",
                    keyword
                ),
            });
        }

        if self.is_vague(question) {
            return Some(ScreeningVerdict {
                strategy: ResponseStrategy::Clarification,
                matched: None,
                explanation: format!(
                    "Question is empty or shorter than {} characters",
                    self.min_question_chars
                ),
            });
        }

        if let Some(keyword) = self.off_topic_match(question) {
            return Some(ScreeningVerdict {
                strategy: ResponseStrategy::OffTopic,
                matched: Some(keyword.to_string()),
                explanation: format!("Question matched the off-topic keyword '{}'", keyword),
            });
        }

        None
    }
}

/// Match keywords against word starts, so "hack" catches "hacking" but "kill"
/// does not catch "skill". Keywords containing separators ("self-harm") match
/// as plain substrings.
fn find_keyword<'a>(keywords: &'a [String], question: &str) -> Option<&'a str> {
    let lower = question.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    keywords
        .iter()
        .map(|k| k.as_str())
        .find(|keyword| {
            let keyword = keyword.to_lowercase();
            if keyword.is_empty() {
                false
            } else if keyword.chars().all(char::is_alphanumeric) {
                words.iter().any(|w| w.starts_with(&keyword))
            } else {
                lower.contains(&keyword)
            }
        })
}
