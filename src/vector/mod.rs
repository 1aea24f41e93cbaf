// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod storage;
pub mod types;

pub use embeddings::Embedding;
pub use errors::VectorIndexError;
pub use index::{IndexSnapshot, VectorIndex};
pub use storage::{IndexStorage, PersistedIndex};
pub use types::{Document, IndexStats, KnowledgeEntry, Metadata, QueryResult, SearchOptions};
