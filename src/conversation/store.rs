// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::persistence::{ConversationLog, LogRecord, LogWriter};
use super::types::{is_valid_conversation_id, Conversation, ConversationTurn};
use super::ConversationError;

/// In-memory conversation store with optional JSONL log
///
/// The map lock is held only to look up or insert a conversation entry; the
/// append itself happens under that conversation's own mutex. Log records are
/// handed to a single writer task, so no lock is held across file I/O.
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Arc<Mutex<Conversation>>>>,
    log: Option<LogWriter>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            log: None,
        }
    }

    /// Open a store backed by a conversation log, replaying existing records
    pub async fn open(log: ConversationLog) -> Result<Self, ConversationError> {
        let records = log.replay().await?;
        let record_count = records.len();

        let mut conversations: HashMap<String, Conversation> = HashMap::new();
        for record in records {
            conversations
                .entry(record.conversation_id.clone())
                .or_insert_with(|| Conversation::new(record.conversation_id.clone(), record.created_at))
                .turns
                .push(record.turn);
        }

        info!(
            "Replayed {} turns into {} conversations from {}",
            record_count,
            conversations.len(),
            log.path().display()
        );

        let conversations = conversations
            .into_iter()
            .map(|(id, conversation)| (id, Arc::new(Mutex::new(conversation))))
            .collect();

        Ok(Self {
            conversations: RwLock::new(conversations),
            log: Some(log.spawn_writer()),
        })
    }

    /// Append a turn, creating a conversation when the id is omitted or unknown
    ///
    /// Returns the id of the conversation the turn was appended to.
    pub async fn append(
        &self,
        conversation_id: Option<&str>,
        mut turn: ConversationTurn,
    ) -> Result<String, ConversationError> {
        let (id, entry) = self.entry_for(conversation_id, &turn).await;

        let mut conversation = entry.lock().await;
        if let Some(last) = conversation.turns.last() {
            if turn.timestamp <= last.timestamp {
                turn.timestamp = last.timestamp + Duration::microseconds(1);
            }
        }

        if let Some(log) = &self.log {
            let record = LogRecord {
                conversation_id: id.clone(),
                created_at: conversation.created_at,
                turn: turn.clone(),
            };
            // Queued under the conversation lock so the log keeps per-conversation order
            if let Err(e) = log.send(record) {
                warn!("Failed to log turn for conversation {}: {}", id, e);
            }
        }

        conversation.turns.push(turn);
        debug!(
            "Appended turn {} to conversation {}",
            conversation.turns.len(),
            id
        );
        Ok(id)
    }

    /// Wait for queued log records to reach disk
    pub async fn flush(&self) -> Result<(), ConversationError> {
        match &self.log {
            Some(log) => log.flush().await,
            None => Ok(()),
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Conversation, ConversationError> {
        let entry = {
            let conversations = self.conversations.read().await;
            conversations.get(conversation_id).cloned()
        };

        match entry {
            Some(entry) => Ok(entry.lock().await.clone()),
            None => Err(ConversationError::NotFound(conversation_id.to_string())),
        }
    }

    pub async fn contains(&self, conversation_id: &str) -> bool {
        self.conversations.read().await.contains_key(conversation_id)
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }

    async fn entry_for(
        &self,
        conversation_id: Option<&str>,
        first_turn: &ConversationTurn,
    ) -> (String, Arc<Mutex<Conversation>>) {
        if let Some(id) = conversation_id.filter(|id| is_valid_conversation_id(id)) {
            if let Some(entry) = self.conversations.read().await.get(id) {
                return (id.to_string(), entry.clone());
            }
        }

        let mut conversations = self.conversations.write().await;
        let mut id = Uuid::new_v4().to_string();
        while conversations.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        match conversation_id {
            Some(requested) => info!(
                "Unknown conversation id {:?}, started conversation {}",
                requested, id
            ),
            None => info!("Started conversation {}", id),
        }

        let entry = Arc::new(Mutex::new(Conversation::new(id.clone(), first_turn.timestamp)));
        conversations.insert(id.clone(), entry.clone());
        (id, entry)
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
