// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Append-only JSON Lines log of conversation turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::types::ConversationTurn;
use super::ConversationError;

/// One appended turn as written to the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub turn: ConversationTurn,
}

enum LogCommand {
    Append(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// Location of a conversation log
#[derive(Debug, Clone)]
pub struct ConversationLog {
    path: PathBuf,
}

/// Handle to the task that owns the log file
///
/// Records are queued without waiting for disk I/O and written in the order
/// they were sent. Write failures are logged by the task and the record is
/// dropped.
#[derive(Debug, Clone)]
pub struct LogWriter {
    sender: mpsc::UnboundedSender<LogCommand>,
}

impl LogWriter {
    pub fn send(&self, record: LogRecord) -> Result<(), ConversationError> {
        self.sender
            .send(LogCommand::Append(record))
            .map_err(|_| writer_stopped())
    }

    /// Wait until every record sent so far has been written
    pub async fn flush(&self) -> Result<(), ConversationError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(LogCommand::Flush(ack))
            .map_err(|_| writer_stopped())?;
        done.await
            .map_err(|_| writer_stopped())
    }
}

impl ConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the single writer task for this log
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// [`LogWriter`] clone is dropped.
    pub fn spawn_writer(&self) -> LogWriter {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(self.path.clone(), receiver));
        LogWriter { sender }
    }

    /// Read every record in the log
    ///
    /// A missing file yields no records. Malformed lines are skipped with a
    /// warning.
    pub async fn replay(&self) -> Result<Vec<LogRecord>, ConversationError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(persistence(e)),
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed conversation log line {} in {}: {}",
                    line_no + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }
}

async fn run_writer(path: PathBuf, mut receiver: mpsc::UnboundedReceiver<LogCommand>) {
    let mut file: Option<File> = None;

    while let Some(command) = receiver.recv().await {
        match command {
            LogCommand::Append(record) => {
                if let Err(e) = write_record(&path, &mut file, &record).await {
                    warn!(
                        "Failed to log turn for conversation {} to {}: {}",
                        record.conversation_id,
                        path.display(),
                        e
                    );
                    // Reopen on the next record
                    file = None;
                }
            }
            LogCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Conversation log writer for {} stopped", path.display());
}

async fn write_record(
    path: &Path,
    file: &mut Option<File>,
    record: &LogRecord,
) -> Result<(), ConversationError> {
    let mut line = serde_json::to_string(record).map_err(persistence)?;
    line.push('\n');

    if file.is_none() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(persistence)?;
            }
        }
        let opened = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(persistence)?;
        *file = Some(opened);
    }
    let Some(handle) = file.as_mut() else {
        return Err(ConversationError::Persistence("log file not open".to_string()));
    };

    handle.write_all(line.as_bytes()).await.map_err(persistence)?;
    handle.flush().await.map_err(persistence)?;
    Ok(())
}

fn writer_stopped() -> ConversationError {
    ConversationError::Persistence("conversation log writer stopped".to_string())
}

fn persistence(e: impl std::fmt::Display) -> ConversationError {
    ConversationError::Persistence(e.to_string())
}
