// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Knowledge-base vector index
//!
//! The index is an immutable [`IndexSnapshot`] behind a single `Arc`. Searches
//! clone the `Arc` and score against it without holding any lock; a build
//! embeds everything first and then swaps the new snapshot in with one write.
//! A search that started before the swap finishes on the old snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::embeddings::Embedding;
use super::errors::VectorIndexError;
use super::storage::{IndexStorage, PersistedIndex};
use super::types::{Document, IndexStats, KnowledgeEntry, Metadata, QueryResult, SearchOptions};
use crate::embeddings::Embedder;

/// A fully built, read-only index
#[derive(Debug)]
pub struct IndexSnapshot {
    documents: Vec<Document>,
    /// Unit-length copies of the document embeddings, same order as `documents`
    normalized: Vec<Embedding>,
    dimension: usize,
    embedder: String,
    built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    fn new(documents: Vec<Document>, dimension: usize, embedder: String, built_at: DateTime<Utc>) -> Self {
        let normalized = documents
            .iter()
            .map(|d| Embedding::new(d.embedding.clone()).normalized())
            .collect();
        Self {
            documents,
            normalized,
            dimension,
            embedder,
            built_at,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            document_count: self.documents.len(),
            dimension: self.dimension,
            embedder: self.embedder.clone(),
            built_at: self.built_at,
        }
    }

    /// Score every document against `query`
    ///
    /// Results are sorted by score descending; equal scores keep build order.
    pub fn score(
        &self,
        query: &[f32],
        k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<QueryResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query = Embedding::new(query.to_vec()).normalized();

        let mut scored: Vec<(usize, f32)> = self
            .normalized
            .iter()
            .enumerate()
            .filter(|(position, _)| match &options.filter {
                Some(filter) => matches_filter(&self.documents[*position].metadata, filter),
                None => true,
            })
            .map(|(position, embedding)| (position, query.dot_product(embedding)))
            .filter(|(_, score)| options.min_score.map_or(true, |min| *score >= min))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| QueryResult {
                document: self.documents[position].clone(),
                score,
            })
            .collect())
    }
}

fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    /// Serializes builds so the last build to finish is the last one started
    build_lock: Mutex<()>,
    storage: Option<IndexStorage>,
}

impl VectorIndex {
    /// In-memory index
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
            storage: None,
        }
    }

    /// Index persisted under `storage`, reloading any compatible snapshot
    pub async fn open(embedder: Arc<dyn Embedder>, storage: IndexStorage) -> Self {
        let mut snapshot = None;

        if let Some(persisted) = storage.load().await {
            if persisted.embedder != embedder.name() || persisted.dimension != embedder.dimension() {
                warn!(
                    "Ignoring persisted index built with {} ({}D); current embedder is {} ({}D)",
                    persisted.embedder,
                    persisted.dimension,
                    embedder.name(),
                    embedder.dimension()
                );
            } else if persisted
                .documents
                .iter()
                .any(|d| d.embedding.len() != persisted.dimension)
            {
                warn!("Ignoring persisted index with inconsistent vector dimensions");
            } else if persisted.documents.is_empty() {
                debug!("Persisted index has no documents");
            } else {
                info!(
                    "Loaded persisted index: {} documents from {}",
                    persisted.documents.len(),
                    storage.snapshot_path().display()
                );
                snapshot = Some(Arc::new(IndexSnapshot::new(
                    persisted.documents,
                    persisted.dimension,
                    persisted.embedder,
                    persisted.built_at,
                )));
            }
        }

        Self {
            embedder,
            current: RwLock::new(snapshot),
            build_lock: Mutex::new(()),
            storage: Some(storage),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// The live snapshot, if any build has succeeded
    pub async fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.read().await.clone()
    }

    pub async fn is_built(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn stats(&self) -> Option<IndexStats> {
        self.snapshot().await.map(|s| s.stats())
    }

    /// Embed `entries` and replace the live index with the result
    ///
    /// Entries with blank text are skipped. On any error the previous
    /// snapshot stays live. When persistence is configured the new snapshot
    /// is saved after the swap, and a failed save is logged, not returned.
    pub async fn build(&self, entries: Vec<KnowledgeEntry>) -> Result<IndexStats, VectorIndexError> {
        let _build_guard = self.build_lock.lock().await;
        let start = Instant::now();

        let total = entries.len();
        let entries: Vec<KnowledgeEntry> = entries
            .into_iter()
            .filter(|e| !e.text.trim().is_empty())
            .collect();
        if entries.len() < total {
            warn!("Skipped {} knowledge-base entries with empty text", total - entries.len());
        }
        if entries.is_empty() {
            return Err(VectorIndexError::NoDocuments);
        }

        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let dimension = self.embedder.dimension();
        let mut documents = Vec::with_capacity(entries.len());
        for (position, (entry, vector)) in entries.into_iter().zip(vectors).enumerate() {
            if vector.len() != dimension {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            documents.push(Document {
                id: Document::id_for_position(position),
                text: entry.text,
                metadata: entry.metadata,
                embedding: vector,
            });
        }

        let built_at = Utc::now();
        let snapshot = Arc::new(IndexSnapshot::new(
            documents,
            dimension,
            self.embedder.name().to_string(),
            built_at,
        ));
        let stats = snapshot.stats();

        *self.current.write().await = Some(snapshot.clone());

        // The in-memory index is authoritative; a failed save only loses the restart copy
        if let Some(storage) = &self.storage {
            let persisted = PersistedIndex::new(
                self.embedder.name(),
                dimension,
                built_at,
                snapshot.documents().to_vec(),
            );
            if let Err(e) = storage.save(persisted).await {
                warn!(
                    "Failed to persist index snapshot to {}: {}",
                    storage.snapshot_path().display(),
                    e
                );
            }
        }

        info!(
            "Built vector index: {} documents, {}D, embedder {}, in {}ms",
            stats.document_count,
            stats.dimension,
            stats.embedder,
            start.elapsed().as_millis()
        );
        Ok(stats)
    }

    /// Top-`k` documents by cosine similarity to `query`
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<QueryResult>, VectorIndexError> {
        self.search_with_options(query, k, &SearchOptions::default())
            .await
    }

    /// Like [`VectorIndex::search`], restricted to documents whose metadata
    /// contains every pair in `filter`
    pub async fn search_with_filter(
        &self,
        query: &str,
        k: usize,
        filter: Metadata,
    ) -> Result<Vec<QueryResult>, VectorIndexError> {
        let options = SearchOptions {
            filter: Some(filter),
            ..SearchOptions::default()
        };
        self.search_with_options(query, k, &options).await
    }

    pub async fn search_with_options(
        &self,
        query: &str,
        k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<QueryResult>, VectorIndexError> {
        if query.trim().is_empty() {
            return Err(VectorIndexError::InvalidQuery(
                "query text is empty".to_string(),
            ));
        }
        if k == 0 {
            return Err(VectorIndexError::InvalidQuery(
                "k must be greater than 0".to_string(),
            ));
        }

        // Pin the snapshot first; a concurrent build cannot change what we score against
        let snapshot = self.snapshot().await.ok_or(VectorIndexError::EmptyIndex)?;

        let start = Instant::now();
        let query_vector = self.embedder.embed(query).await?;
        let results = snapshot.score(&query_vector, k, options)?;

        debug!(
            "Search returned {} of {} documents in {}ms",
            results.len(),
            snapshot.len(),
            start.elapsed().as_millis()
        );
        Ok(results)
    }
}
