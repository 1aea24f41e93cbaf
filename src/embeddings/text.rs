// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Word-level text normalisation shared by the hashing embedder and the
//! token budget metric.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Common English words that carry no retrieval signal
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from",
    "has", "have", "how", "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "our",
    "that", "the", "their", "this", "to", "us", "was", "we", "what", "when", "where", "which",
    "who", "will", "with", "you", "your",
];

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+").expect("static word pattern is valid"))
}

/// Byte ranges of every word in `text`
pub fn word_spans(text: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    word_pattern().find_iter(text).map(|m| m.range())
}

/// Number of words in `text`
pub fn count_words(text: &str) -> usize {
    word_pattern().find_iter(text).count()
}

/// Lower-cased words of `text`, in order
pub fn pre_tokenize(text: &str) -> Vec<String> {
    word_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Strip the most common inflections so "remodels" and "remodeling" meet
pub fn stem(word: &str) -> &str {
    let len = word.len();
    if len > 5 && word.ends_with("ing") {
        &word[..len - 3]
    } else if len > 4 && word.ends_with("ed") {
        &word[..len - 2]
    } else if len > 3 && word.ends_with('s') && !word.ends_with("ss") {
        &word[..len - 1]
    } else {
        word
    }
}

/// Retrieval terms: words minus stop words, stemmed
pub fn index_terms(text: &str) -> Vec<String> {
    pre_tokenize(text)
        .into_iter()
        .filter(|w| !is_stop_word(w))
        .map(|w| stem(&w).to_string())
        .collect()
}
