// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the retrieval-and-response pipeline
//!
//! - [`GenerationError`] covers the text-generation capability
//! - [`RagError`] is what the query entry points surface to callers

use thiserror::Error;

use crate::conversation::ConversationError;
use crate::vector::VectorIndexError;

/// Errors from the text-generation capability
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Backend could not be reached or answered with an error status
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered but produced no usable text
    #[error("Generation backend returned no text")]
    EmptyResponse,

    /// Parameters rejected before calling the backend
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),
}

impl GenerationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GenerationError::Unavailable(_) => "GENERATION_UNAVAILABLE",
            GenerationError::EmptyResponse => "GENERATION_EMPTY_RESPONSE",
            GenerationError::InvalidRequest(_) => "GENERATION_INVALID_REQUEST",
        }
    }

    /// Check if a smaller retry could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Unavailable(_) | GenerationError::EmptyResponse
        )
    }
}

/// Errors surfaced by the pipeline entry points
#[derive(Error, Debug)]
pub enum RagError {
    /// Caller input rejected; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

impl RagError {
    /// Get user-friendly error message for API responses
    pub fn user_message(&self) -> String {
        match self {
            RagError::Validation(msg) => msg.clone(),
            RagError::Index(VectorIndexError::NoDocuments) => {
                "The knowledge base contains no usable entries".to_string()
            }
            RagError::Index(_) => "The knowledge base is unavailable right now".to_string(),
            RagError::Conversation(ConversationError::NotFound(id)) => {
                format!("Conversation {} was not found", id)
            }
            RagError::Conversation(_) => "Conversation history is unavailable".to_string(),
            RagError::Generation(_) => {
                "We couldn't generate a response right now, please try again".to_string()
            }
        }
    }

    /// Get error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "VALIDATION_ERROR",
            RagError::Index(e) => e.error_code(),
            RagError::Conversation(e) => e.error_code(),
            RagError::Generation(e) => e.error_code(),
        }
    }
}
