// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! On-disk persistence for index snapshots
//!
//! A snapshot is written to a temporary file in the target directory and then
//! renamed over the previous one, so a crash mid-write leaves the old file
//! intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::errors::VectorIndexError;
use super::types::Document;

const SNAPSHOT_FILE: &str = "index.bin";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub version: u32,
    pub embedder: String,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone)]
pub struct IndexStorage {
    dir: PathBuf,
}

impl IndexStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically replace the persisted snapshot
    pub async fn save(&self, index: PersistedIndex) -> Result<(), VectorIndexError> {
        let dir = self.dir.clone();
        let path = self.snapshot_path();

        tokio::task::spawn_blocking(move || -> Result<(), VectorIndexError> {
            std::fs::create_dir_all(&dir).map_err(persistence)?;
            let bytes = bincode::serialize(&index).map_err(persistence)?;

            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(persistence)?;
            tmp.write_all(&bytes).map_err(persistence)?;
            tmp.as_file().sync_all().map_err(persistence)?;
            tmp.persist(&path).map_err(|e| persistence(e.error))?;

            info!(
                "Persisted index snapshot: {} documents to {}",
                index.documents.len(),
                path.display()
            );
            Ok(())
        })
        .await
        .map_err(persistence)?
    }

    /// Load the persisted snapshot if one exists
    ///
    /// An unreadable or incompatible file is reported and treated as absent.
    pub async fn load(&self) -> Option<PersistedIndex> {
        let path = self.snapshot_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read index snapshot {}: {}", path.display(), e);
                return None;
            }
        };

        match bincode::deserialize::<PersistedIndex>(&bytes) {
            Ok(index) if index.version == FORMAT_VERSION => Some(index),
            Ok(index) => {
                warn!(
                    "Ignoring index snapshot with format version {} (expected {})",
                    index.version, FORMAT_VERSION
                );
                None
            }
            Err(e) => {
                warn!("Ignoring corrupt index snapshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl PersistedIndex {
    pub fn new(embedder: &str, dimension: usize, built_at: DateTime<Utc>, documents: Vec<Document>) -> Self {
        Self {
            version: FORMAT_VERSION,
            embedder: embedder.to_string(),
            dimension,
            built_at,
            documents,
        }
    }
}

fn persistence(e: impl std::fmt::Display) -> VectorIndexError {
    VectorIndexError::Persistence(e.to_string())
}
