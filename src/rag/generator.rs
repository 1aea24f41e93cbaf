// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Response generation
//!
//! [`ResponseGenerator`] owns everything deterministic about answering:
//! prompt construction, output clean-up and length enforcement. The actual
//! text comes from a [`Generator`] backend.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::assembler::PromptContext;
use super::errors::GenerationError;
use super::openai_client::OpenAiGenerator;
use crate::conversation::Role;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly assistant for a home remodeling company. \
Answer questions about our services using only the provided information. \
If the information does not cover the question, say so and suggest booking a consultation.";

/// Role prefixes some models put in front of their answer
const ROLE_LABELS: &[&str] = &["assistant:", "answer:", "response:", "ai:"];

/// Average characters per token used to size backend requests
const CHARS_PER_TOKEN: usize = 4;

/// One call to a generation backend
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    /// Fully rendered prompt
    pub prompt: String,
    pub query: String,
    /// Retrieved passage texts, highest score first
    pub passages: Vec<String>,
    pub room_type: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text-generation capability
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

pub struct ResponseGenerator {
    backend: Arc<dyn Generator>,
    system_prompt: String,
}

impl ResponseGenerator {
    pub fn new(backend: Arc<dyn Generator>) -> Self {
        Self::with_system_prompt(backend, DEFAULT_SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(backend: Arc<dyn Generator>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Render the prompt for a context
    pub fn build_prompt(&self, context: &PromptContext) -> String {
        let mut prompt = String::new();

        if !context.retrieved.is_empty() {
            prompt.push_str("Relevant information:\n");
            for (i, result) in context.retrieved.iter().enumerate() {
                let _ = write!(prompt, "[{}] ", i + 1);
                if let Some(section) = result.document.metadata.get("section") {
                    let _ = write!(prompt, "({}) ", section);
                }
                prompt.push_str(result.document.text.trim());
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        if !context.observations.is_empty() {
            prompt.push_str("Image observations:\n");
            for observation in &context.observations {
                let _ = writeln!(
                    prompt,
                    "- {} (confidence {:.2})",
                    observation.label, observation.confidence
                );
            }
            prompt.push('\n');
        }

        if !context.history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in &context.history {
                let speaker = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                let _ = writeln!(prompt, "{}: {}", speaker, turn.text.trim());
            }
            prompt.push('\n');
        }

        let _ = write!(prompt, "Question: {}\nAnswer:", context.query.trim());
        prompt
    }

    /// Generate an answer of at most `max_length` characters
    pub async fn generate(
        &self,
        context: &PromptContext,
        temperature: f32,
        max_length: usize,
    ) -> Result<String, GenerationError> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(GenerationError::InvalidRequest(format!(
                "temperature must be within [0, 1], got {}",
                temperature
            )));
        }
        if max_length == 0 {
            return Err(GenerationError::InvalidRequest(
                "max_length must be greater than zero".to_string(),
            ));
        }

        let prompt = self.build_prompt(context);
        let request = GenerationRequest {
            system: self.system_prompt.clone(),
            prompt,
            query: context.query.clone(),
            passages: context
                .retrieved
                .iter()
                .map(|r| r.document.text.clone())
                .collect(),
            room_type: context.room_type().map(str::to_string),
            temperature,
            max_tokens: max_length.div_ceil(CHARS_PER_TOKEN) as u32,
        };

        let start = Instant::now();
        let raw = self.backend.complete(&request).await?;
        debug!(
            "Backend {} returned {} chars in {}ms",
            self.backend.name(),
            raw.len(),
            start.elapsed().as_millis()
        );

        let cleaned = clean_response(&raw, &request.prompt, &request.passages);
        if cleaned.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        let answer = truncate_at_word_boundary(&cleaned, max_length);
        info!(
            "Generated {} char answer with {} (temperature {})",
            answer.chars().count(),
            self.backend.name(),
            temperature
        );
        Ok(answer.to_string())
    }
}

/// Strip prompt echoes, role labels and passages repeated line for line
pub fn clean_response(raw: &str, prompt: &str, passages: &[String]) -> String {
    let mut text = raw.trim();

    let prompt = prompt.trim();
    if !prompt.is_empty() {
        if let Some(rest) = text.strip_prefix(prompt) {
            text = rest.trim_start();
        }
    }

    loop {
        let lower = text.to_lowercase();
        match ROLE_LABELS.iter().find(|label| lower.starts_with(*label)) {
            // Labels are ASCII so byte offsets agree with the lower-cased copy
            Some(label) => text = text[label.len()..].trim_start(),
            None => break,
        }
    }

    let repeats_passage = |line: &str| {
        let trimmed = line.trim();
        !trimmed.is_empty() && passages.iter().any(|p| p.trim() == trimmed)
    };
    // Passage lines are only echo when the answer says something else too
    let has_own_text = text
        .lines()
        .any(|line| !line.trim().is_empty() && !repeats_passage(line));

    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if has_own_text && repeats_passage(line) {
            continue;
        }
        // Collapse runs of blank lines
        if line.trim().is_empty() && lines.last().map_or(true, |l| l.trim().is_empty()) {
            continue;
        }
        lines.push(line.trim_end());
    }

    lines.join("\n").trim().to_string()
}

/// Cut `text` to at most `max_chars` characters, preferring a word boundary
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> &str {
    let end = match text.char_indices().nth(max_chars) {
        Some((end, _)) => end,
        None => return text,
    };

    let prefix = &text[..end];
    // Cutting exactly before whitespace already lands on a boundary
    if text[end..].starts_with(char::is_whitespace) {
        return prefix.trim_end();
    }
    match prefix.rfind(char::is_whitespace) {
        Some(boundary) if !prefix[..boundary].trim_end().is_empty() => prefix[..boundary].trim_end(),
        _ => prefix,
    }
}

/// Offline extractive generator
///
/// Answers from the top retrieved passages and the observed room type.
/// Ignores temperature, so output is fully deterministic.
#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

const TEMPLATE_PASSAGES: usize = 2;

#[async_trait]
impl Generator for TemplateGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut answer = match &request.room_type {
            Some(room) => format!(
                "Based on your {} photo, here is what we can tell you:",
                room.replace('_', " ")
            ),
            None => "Here is what we can tell you:".to_string(),
        };

        if request.passages.is_empty() {
            answer = "I don't have specific information about that in our knowledge base.".to_string();
        } else {
            for passage in request.passages.iter().take(TEMPLATE_PASSAGES) {
                answer.push(' ');
                answer.push_str(passage.trim());
            }
        }
        answer.push_str(" Would you like to schedule a free consultation?");
        Ok(answer)
    }

    fn name(&self) -> &str {
        "template"
    }
}

pub const TEMPLATE_BACKEND: &str = "template";
pub const OPENAI_BACKEND: &str = "openai";

/// Build a generation backend from its configured name
pub fn create_generator(
    backend: &str,
    endpoint: &str,
    model: &str,
    api_key: Option<&str>,
) -> anyhow::Result<Arc<dyn Generator>> {
    match backend {
        TEMPLATE_BACKEND => Ok(Arc::new(TemplateGenerator::new())),
        OPENAI_BACKEND => Ok(Arc::new(OpenAiGenerator::new(endpoint, model, api_key)?)),
        other => anyhow::bail!("Unknown generation backend: {}", other),
    }
}
