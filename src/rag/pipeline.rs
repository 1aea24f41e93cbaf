// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Query entry points
//!
//! Ties retrieval, context assembly, generation and conversation state
//! together. Failures of optional collaborators degrade the answer instead of
//! failing the request:
//! - image analysis errors mean "no observations"
//! - an unbuilt index or embedding failure gives a fixed "not enough
//!   information" answer
//! - generation errors are retried once with half the length, then answered
//!   with a fixed apology

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::assembler::{ContextAssembler, PromptContext};
use super::errors::RagError;
use super::generator::ResponseGenerator;
use crate::conversation::{Conversation, ConversationError, ConversationStore, ConversationTurn};
use crate::vector::{IndexStats, KnowledgeEntry, QueryResult, VectorIndex};
use crate::vision::{FeatureExtractor, ImageObservation};

pub const INSUFFICIENT_INFORMATION_ANSWER: &str = "I don't have enough information to answer that right now. \
Please contact us directly and we'll be glad to help with your project.";

pub const GENERATION_FALLBACK_ANSWER: &str = "I'm sorry, I'm having trouble putting together an answer right now. \
Please try again in a moment or contact us directly for a consultation.";

/// Per-request parameters of the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub top_k: usize,
    pub context_budget: usize,
    pub temperature: f32,
    pub max_response_chars: usize,
    /// Observations below this confidence are not used as search terms
    pub min_observation_confidence: f32,
    pub history_turns: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            context_budget: 2000,
            temperature: 0.7,
            max_response_chars: 1200,
            min_observation_confidence: 0.5,
            history_turns: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextQueryResponse {
    pub conversation_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageQueryResponse {
    pub conversation_id: String,
    pub answer: String,
    pub observations: Vec<ImageObservation>,
}

pub struct RagPipeline {
    index: Arc<VectorIndex>,
    conversations: Arc<ConversationStore>,
    assembler: ContextAssembler,
    generator: ResponseGenerator,
    extractor: Option<Arc<dyn FeatureExtractor>>,
    config: PipelineConfig,
}

impl RagPipeline {
    pub fn new(
        index: Arc<VectorIndex>,
        conversations: Arc<ConversationStore>,
        assembler: ContextAssembler,
        generator: ResponseGenerator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            index,
            conversations,
            assembler,
            generator,
            extractor: None,
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer a text question
    pub async fn handle_text_query(
        &self,
        conversation_id: Option<&str>,
        query: &str,
    ) -> Result<TextQueryResponse, RagError> {
        let (conversation_id, answer) = self.answer(conversation_id, query, &[]).await?;
        Ok(TextQueryResponse {
            conversation_id,
            answer,
        })
    }

    /// Answer a question about an uploaded image
    pub async fn handle_image_query(
        &self,
        conversation_id: Option<&str>,
        query: &str,
        image: &[u8],
    ) -> Result<ImageQueryResponse, RagError> {
        validate_query(query)?;
        let observations = self.extract_features(conversation_id, image).await;
        let (conversation_id, answer) = self.answer(conversation_id, query, &observations).await?;
        Ok(ImageQueryResponse {
            conversation_id,
            answer,
            observations,
        })
    }

    /// Raw retrieval without generation
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<QueryResult>, RagError> {
        Ok(self.index.search(query, k).await?)
    }

    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation, RagError> {
        Ok(self.conversations.get(conversation_id).await?)
    }

    /// Replace the knowledge base
    pub async fn rebuild(&self, entries: Vec<KnowledgeEntry>) -> Result<IndexStats, RagError> {
        Ok(self.index.build(entries).await?)
    }

    async fn extract_features(
        &self,
        conversation_id: Option<&str>,
        image: &[u8],
    ) -> Vec<ImageObservation> {
        let Some(extractor) = &self.extractor else {
            debug!("Image analysis disabled, ignoring {} byte image", image.len());
            return Vec::new();
        };

        match extractor.extract_features(image).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!(
                    conversation_id = conversation_id.unwrap_or("new"),
                    extractor = extractor.name(),
                    "Image analysis failed, continuing without observations: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    async fn answer(
        &self,
        conversation_id: Option<&str>,
        query: &str,
        observations: &[ImageObservation],
    ) -> Result<(String, String), RagError> {
        validate_query(query)?;
        let start = Instant::now();
        let query = query.trim();

        let history = self.history(conversation_id).await;

        let search_query = self.expand_query(query, observations);
        let retrieved = match self.index.search(&search_query, self.config.top_k).await {
            Ok(results) => Some(results),
            Err(e) if e.is_degradable() => {
                warn!(
                    conversation_id = conversation_id.unwrap_or("new"),
                    error = e.error_code(),
                    "Retrieval unavailable for query {:?}: {}",
                    query,
                    e
                );
                None
            }
            Err(e) => {
                error!(
                    conversation_id = conversation_id.unwrap_or("new"),
                    error = e.error_code(),
                    "Retrieval failed for query {:?}: {}",
                    query,
                    e
                );
                return Err(e.into());
            }
        };

        let user_turn = ConversationTurn::user(query).with_attachments(observations.to_vec());
        let conversation_id = self.conversations.append(conversation_id, user_turn).await?;

        let answer = match retrieved {
            Some(retrieved) => {
                let context = self.assembler.assemble(
                    query,
                    &retrieved,
                    &history,
                    observations,
                    self.config.context_budget,
                );
                self.generate_with_fallback(&conversation_id, &context).await
            }
            None => INSUFFICIENT_INFORMATION_ANSWER.to_string(),
        };

        self.conversations
            .append(Some(&conversation_id), ConversationTurn::assistant(answer.clone()))
            .await?;

        info!(
            "Answered query for conversation {} in {}ms",
            conversation_id,
            start.elapsed().as_millis()
        );
        Ok((conversation_id, answer))
    }

    async fn history(&self, conversation_id: Option<&str>) -> Vec<ConversationTurn> {
        let Some(id) = conversation_id else {
            return Vec::new();
        };

        match self.conversations.get(id).await {
            Ok(conversation) => conversation.recent(self.config.history_turns).to_vec(),
            Err(ConversationError::NotFound(_)) => {
                debug!("Conversation {} not found, starting a new one", id);
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to load history for conversation {}: {}", id, e);
                Vec::new()
            }
        }
    }

    /// Append confident image labels to the query as extra search terms
    fn expand_query(&self, query: &str, observations: &[ImageObservation]) -> String {
        let mut expanded = query.to_string();
        let mut added: Vec<&str> = Vec::new();

        for observation in observations {
            if observation.confidence < self.config.min_observation_confidence {
                continue;
            }
            // Only room types and raw detections describe content
            let descriptive = match observation.label.split_once(':') {
                Some((kind, _)) => kind == "room",
                None => true,
            };
            if !descriptive {
                continue;
            }

            let term = observation.search_term();
            if !added.contains(&term) {
                expanded.push(' ');
                expanded.push_str(&term.replace('_', " "));
                added.push(term);
            }
        }

        if !added.is_empty() {
            debug!("Expanded search query with image terms: {:?}", added);
        }
        expanded
    }

    async fn generate_with_fallback(&self, conversation_id: &str, context: &PromptContext) -> String {
        let temperature = self.config.temperature;
        let max_length = self.config.max_response_chars;

        let first = match self.generator.generate(context, temperature, max_length).await {
            Ok(answer) => return answer,
            Err(e) => e,
        };

        if first.is_retryable() {
            warn!(
                conversation_id,
                error = first.error_code(),
                "Generation failed for query {:?}, retrying shorter: {}",
                context.query,
                first
            );
            let shorter = (max_length / 2).max(1);
            match self.generator.generate(context, temperature, shorter).await {
                Ok(answer) => return answer,
                Err(e) => error!(
                    conversation_id,
                    error = e.error_code(),
                    "Generation retry failed for query {:?}: {}",
                    context.query,
                    e
                ),
            }
        } else {
            error!(
                conversation_id,
                error = first.error_code(),
                "Generation rejected for query {:?}: {}",
                context.query,
                first
            );
        }

        GENERATION_FALLBACK_ANSWER.to_string()
    }
}

fn validate_query(query: &str) -> Result<(), RagError> {
    if query.trim().is_empty() {
        return Err(RagError::Validation("Query text must not be empty".to_string()));
    }
    Ok(())
}
