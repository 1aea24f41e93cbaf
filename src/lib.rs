// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod rag;
pub mod vector;
pub mod vision;

pub use config::RagConfig;
pub use conversation::{Conversation, ConversationStore, ConversationTurn, Role};
pub use embeddings::{create_embedder, Embedder, EmbeddingError, HashingEmbedder};
pub use rag::{
    ImageQueryResponse, PipelineConfig, RagError, RagPipeline, ResponseGenerator,
    TextQueryResponse,
};
pub use vector::{KnowledgeEntry, QueryResult, VectorIndex, VectorIndexError};
pub use vision::{FeatureExtractor, HeuristicRoomAnalyzer, ImageObservation, VisionError};
