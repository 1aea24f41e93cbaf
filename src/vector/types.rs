// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core index types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document metadata; ordered so prompts render deterministically
pub type Metadata = BTreeMap<String, String>;

/// One knowledge-base entry handed to [`super::VectorIndex::build`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub text: String,
    pub metadata: Metadata,
}

impl KnowledgeEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An indexed document; immutable once built into a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl Document {
    /// Id for the document at `position` in build order
    pub fn id_for_position(position: usize) -> String {
        format!("doc-{:05}", position)
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub document: Document,
    pub score: f32,
}

/// Search knobs beyond the query and `k`
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Drop hits scoring below this similarity
    pub min_score: Option<f32>,
    /// Every key/value pair must be present in the document metadata
    pub filter: Option<Metadata>,
}

/// Summary of the live snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub dimension: usize,
    pub embedder: String,
    pub built_at: DateTime<Utc>,
}
