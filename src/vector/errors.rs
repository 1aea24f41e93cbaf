// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for building and searching the vector index

use thiserror::Error;

use crate::embeddings::EmbeddingError;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    /// Search before any successful build
    #[error("Vector index is empty: no knowledge base has been built")]
    EmptyIndex,

    /// Empty query text or zero `k`
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Vector does not match the dimension fixed at build time
    #[error("Dimension mismatch: expected {expected}D, got {actual}D")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Build called with nothing indexable
    #[error("No documents to index")]
    NoDocuments,

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Reading or writing the persisted snapshot failed
    #[error("Index persistence failed: {0}")]
    Persistence(String),
}

impl VectorIndexError {
    /// Get error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            VectorIndexError::EmptyIndex => "EMPTY_INDEX",
            VectorIndexError::InvalidQuery(_) => "INVALID_QUERY",
            VectorIndexError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            VectorIndexError::NoDocuments => "NO_DOCUMENTS",
            VectorIndexError::Embedding(e) => e.error_code(),
            VectorIndexError::Persistence(_) => "INDEX_PERSISTENCE",
        }
    }

    /// Retrieval-path failures that should degrade the answer rather than fail the request
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            VectorIndexError::EmptyIndex
                | VectorIndexError::Embedding(_)
                | VectorIndexError::DimensionMismatch { .. }
        )
    }
}
