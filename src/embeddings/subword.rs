// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Subword token counting for context budgets
//!
//! Two tokenizers are available:
//! - [`SubwordVocabulary`]: built from the knowledge base itself. Frequent
//!   words are single tokens and any other word costs one token per character.
//! - [`PretrainedSubwords`]: a HuggingFace `tokenizer.json` (WordPiece or BPE).

use anyhow::Result;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;
use tokenizers::Tokenizer;
use tracing::{debug, warn};

use super::text::word_spans;

/// Most frequent knowledge-base words kept as whole tokens
pub const DEFAULT_VOCABULARY_WORDS: usize = 3000;

/// Splits text into subword tokens
pub trait SubwordTokenizer: Send + Sync {
    /// Byte range of every token in `text`, in order
    fn token_spans(&self, text: &str) -> Vec<Range<usize>>;

    fn name(&self) -> &str;

    fn count(&self, text: &str) -> usize {
        self.token_spans(text).len()
    }

    /// Longest prefix of `text` holding at most `limit` tokens
    fn truncate<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        if limit == 0 {
            return "";
        }
        let spans = self.token_spans(text);
        if spans.len() <= limit {
            return text;
        }
        let mut end = spans[limit - 1].end.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }
}

fn piece_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+|[^\w\s]").expect("static piece pattern is valid"))
}

/// Word vocabulary learned from a corpus
///
/// An empty vocabulary degrades to one token per character of each word.
#[derive(Debug, Clone, Default)]
pub struct SubwordVocabulary {
    words: HashSet<String>,
}

impl SubwordVocabulary {
    /// Keep the `max_words` most frequent words of `texts`
    ///
    /// Equal frequencies are ordered alphabetically so the result does not
    /// depend on hash order.
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>, max_words: usize) -> Self {
        let mut frequencies: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for span in word_spans(text) {
                let word = &text[span];
                if word.chars().count() > 1 {
                    *frequencies.entry(word.to_lowercase()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = frequencies.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let words: HashSet<String> = ranked
            .into_iter()
            .take(max_words)
            .map(|(word, _)| word)
            .collect();

        debug!("Built subword vocabulary with {} words", words.len());
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }
}

impl SubwordTokenizer for SubwordVocabulary {
    fn token_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        for piece in piece_pattern().find_iter(text) {
            let word = piece.as_str();
            if word.chars().nth(1).is_none() || self.contains(word) {
                spans.push(piece.range());
                continue;
            }
            // Out-of-vocabulary words fall back to characters
            let start = piece.start();
            spans.extend(
                word.char_indices()
                    .map(|(offset, c)| start + offset..start + offset + c.len_utf8()),
            );
        }
        spans
    }

    fn name(&self) -> &str {
        "vocabulary"
    }
}

/// Subword tokenizer loaded from a `tokenizer.json`
pub struct PretrainedSubwords {
    tokenizer: Tokenizer,
}

impl PretrainedSubwords {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", path.display());
        }
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        Ok(Self { tokenizer })
    }
}

impl SubwordTokenizer for PretrainedSubwords {
    fn token_spans(&self, text: &str) -> Vec<Range<usize>> {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding
                .get_offsets()
                .iter()
                .filter(|(start, end)| end > start)
                .map(|(start, end)| *start..*end)
                .collect(),
            Err(e) => {
                warn!("Tokenizer failed, counting words instead: {}", e);
                word_spans(text).collect()
            }
        }
    }

    fn name(&self) -> &str {
        "pretrained"
    }
}
