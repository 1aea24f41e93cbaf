// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded prompt-context assembly
//!
//! Retrieved passages are placed highest score first until the budget runs
//! out. The first passage that does not fit whole is truncated to the
//! remaining budget when at least `min_fragment` units remain, and placement
//! stops there. History fills whatever budget is left, newest turn first.
//! Image observations are always included and never count against the budget.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::generator::truncate_at_word_boundary;
use crate::conversation::ConversationTurn;
use crate::embeddings::subword::{SubwordTokenizer, SubwordVocabulary};
use crate::embeddings::text::{count_words, word_spans};
use crate::vector::QueryResult;
use crate::vision::ImageObservation;

/// How context size is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    #[default]
    Characters,
    /// Words as split by the pre-tokenizer
    Tokens,
    /// Subword tokens from the assembler's tokenizer
    Subwords,
}

impl BudgetUnit {
    /// Size of `text`; subwords are counted without a vocabulary here
    pub fn measure(&self, text: &str) -> usize {
        match self {
            BudgetUnit::Characters => text.chars().count(),
            BudgetUnit::Tokens => count_words(text),
            BudgetUnit::Subwords => SubwordVocabulary::default().count(text),
        }
    }

    /// Longest prefix of `text` measuring at most `limit` units
    ///
    /// Character budgets cut at a word boundary when the prefix has one.
    pub fn truncate<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        match self {
            BudgetUnit::Characters => truncate_at_word_boundary(text, limit),
            BudgetUnit::Tokens => {
                if limit == 0 {
                    return "";
                }
                match word_spans(text).nth(limit - 1) {
                    Some(span) => &text[..span.end],
                    None => text,
                }
            }
            BudgetUnit::Subwords => SubwordVocabulary::default().truncate(text, limit),
        }
    }
}

impl fmt::Display for BudgetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetUnit::Characters => write!(f, "characters"),
            BudgetUnit::Tokens => write!(f, "tokens"),
            BudgetUnit::Subwords => write!(f, "subwords"),
        }
    }
}

impl FromStr for BudgetUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "characters" | "chars" => Ok(BudgetUnit::Characters),
            "tokens" | "words" => Ok(BudgetUnit::Tokens),
            "subwords" | "subword" => Ok(BudgetUnit::Subwords),
            other => Err(format!("Unknown budget unit: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyConfig {
    pub unit: BudgetUnit,
    /// Smallest truncated passage worth including
    pub min_fragment: usize,
    /// Cap on history turns regardless of budget
    pub max_history_turns: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            unit: BudgetUnit::Characters,
            min_fragment: 80,
            max_history_turns: 6,
        }
    }
}

/// Everything the generator sees for one request
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub query: String,
    /// Highest score first; the last passage may be truncated
    pub retrieved: Vec<QueryResult>,
    /// Chronological suffix of the conversation
    pub history: Vec<ConversationTurn>,
    pub observations: Vec<ImageObservation>,
    pub budget: usize,
    /// Budget consumed by passages and history
    pub used: usize,
}

impl PromptContext {
    /// Room type from a `room:<type>` observation, if any
    pub fn room_type(&self) -> Option<&str> {
        self.observations
            .iter()
            .filter_map(|o| o.label.strip_prefix("room:"))
            .next()
    }
}

#[derive(Clone)]
pub struct ContextAssembler {
    config: AssemblyConfig,
    subwords: Arc<dyn SubwordTokenizer>,
}

impl fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("config", &self.config)
            .field("subwords", &self.subwords.name())
            .finish()
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(AssemblyConfig::default())
    }
}

impl ContextAssembler {
    pub fn new(config: AssemblyConfig) -> Self {
        Self::with_subwords(config, Arc::new(SubwordVocabulary::default()))
    }

    /// Assembler whose [`BudgetUnit::Subwords`] budget uses `subwords`
    pub fn with_subwords(config: AssemblyConfig, subwords: Arc<dyn SubwordTokenizer>) -> Self {
        Self { config, subwords }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Size of `text` in the configured budget unit
    pub fn measure(&self, text: &str) -> usize {
        match self.config.unit {
            BudgetUnit::Subwords => self.subwords.count(text),
            unit => unit.measure(text),
        }
    }

    fn truncate<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        match self.config.unit {
            BudgetUnit::Subwords => self.subwords.truncate(text, limit),
            unit => unit.truncate(text, limit),
        }
    }

    pub fn assemble(
        &self,
        query: &str,
        retrieved: &[QueryResult],
        history: &[ConversationTurn],
        observations: &[ImageObservation],
        budget: usize,
    ) -> PromptContext {
        let unit = self.config.unit;
        let mut remaining = budget;

        let mut ranked: Vec<&QueryResult> = retrieved.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut placed = Vec::new();
        for result in ranked {
            let size = self.measure(&result.document.text);
            if size <= remaining {
                remaining -= size;
                placed.push(result.clone());
                continue;
            }

            if remaining > 0 && remaining >= self.config.min_fragment {
                let fragment = self.truncate(&result.document.text, remaining);
                // Re-tokenizing a prefix can count differently than the whole text
                let size = self.measure(fragment);
                if !fragment.trim().is_empty() && size <= remaining {
                    remaining -= size;
                    let mut truncated = result.clone();
                    truncated.document.text = fragment.to_string();
                    placed.push(truncated);
                }
            }
            break;
        }

        let mut window = Vec::new();
        for turn in history.iter().rev().take(self.config.max_history_turns) {
            let size = self.measure(&turn.text);
            if size > remaining {
                break;
            }
            remaining -= size;
            window.push(turn.clone());
        }
        window.reverse();

        debug!(
            "Assembled context: {} passages, {} history turns, {} observations, {}/{} {}",
            placed.len(),
            window.len(),
            observations.len(),
            budget - remaining,
            budget,
            unit
        );

        PromptContext {
            query: query.to_string(),
            retrieved: placed,
            history: window,
            observations: observations.to_vec(),
            budget,
            used: budget - remaining,
        }
    }
}
