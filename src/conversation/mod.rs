// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Conversation state
//!
//! Per-conversation turn history keyed by an opaque conversation id. Appends
//! to one conversation are serialized; different conversations proceed
//! concurrently.

pub mod persistence;
pub mod store;
pub mod types;

pub use persistence::{ConversationLog, LogRecord, LogWriter};
pub use store::ConversationStore;
pub use types::{is_valid_conversation_id, Conversation, ConversationTurn, Role};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Conversation log error: {0}")]
    Persistence(String),
}

impl ConversationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CONVERSATION_NOT_FOUND",
            Self::Persistence(_) => "CONVERSATION_PERSISTENCE_ERROR",
        }
    }
}
