// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Plain-text knowledge base loading
//!
//! Paragraphs are separated by blank lines. A line starting with `#` opens a
//! section whose title is recorded on every following chunk. Paragraphs
//! longer than the chunk size are split at sentence boundaries.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::vector::KnowledgeEntry;

pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Parse knowledge base text into index entries
pub fn parse_knowledge_base(text: &str, source: &str, chunk_size: usize) -> Vec<KnowledgeEntry> {
    let chunk_size = chunk_size.max(1);
    let mut entries = Vec::new();
    let mut section: Option<String> = None;
    let mut paragraph: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, section.as_deref(), source, chunk_size, &mut entries);
        } else if trimmed.starts_with('#') {
            flush_paragraph(&mut paragraph, section.as_deref(), source, chunk_size, &mut entries);
            let title = trimmed.trim_start_matches('#').trim();
            section = (!title.is_empty()).then(|| title.to_string());
        } else {
            paragraph.push(trimmed);
        }
    }
    flush_paragraph(&mut paragraph, section.as_deref(), source, chunk_size, &mut entries);

    entries
}

fn flush_paragraph(
    paragraph: &mut Vec<&str>,
    section: Option<&str>,
    source: &str,
    chunk_size: usize,
    entries: &mut Vec<KnowledgeEntry>,
) {
    if paragraph.is_empty() {
        return;
    }
    let joined = paragraph.join(" ");
    paragraph.clear();

    for chunk in split_into_chunks(&joined, chunk_size) {
        let mut entry = KnowledgeEntry::new(chunk)
            .with_metadata("source", source)
            .with_metadata("chunk", entries.len().to_string());
        if let Some(section) = section {
            entry = entry.with_metadata("section", section);
        }
        entries.push(entry);
    }
}

/// Split text into chunks of at most `chunk_size` characters
///
/// Sentences are kept whole where possible; a single sentence longer than
/// the chunk size is split at word boundaries.
fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        for piece in split_long(sentence, chunk_size) {
            let piece_len = piece.chars().count();
            let joined_len = if current.is_empty() {
                piece_len
            } else {
                current_len + 1 + piece_len
            };

            if joined_len > chunk_size && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(piece);
            current_len += piece_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some((next, n)) = chars.peek().copied() {
                if n.is_whitespace() {
                    let sentence = text[start..next].trim();
                    if !sentence.is_empty() {
                        out.push(sentence);
                    }
                    start = next;
                }
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Break a single over-long sentence at word boundaries
fn split_long(sentence: &str, chunk_size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = sentence;

    while rest.chars().count() > chunk_size {
        let limit = rest
            .char_indices()
            .nth(chunk_size)
            .map_or(rest.len(), |(i, _)| i);
        let cut = if rest[limit..].starts_with(char::is_whitespace) {
            limit
        } else {
            match rest[..limit].rfind(char::is_whitespace) {
                Some(ws) if ws > 0 => ws,
                _ => limit,
            }
        };
        pieces.push(rest[..cut].trim_end());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Load and parse a knowledge base file
pub async fn load_knowledge_base(path: &Path, chunk_size: usize) -> Result<Vec<KnowledgeEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read knowledge base {}", path.display()))?;

    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let entries = parse_knowledge_base(&text, &source, chunk_size);
    info!(
        "Loaded {} knowledge base entries from {}",
        entries.len(),
        path.display()
    );
    Ok(entries)
}
