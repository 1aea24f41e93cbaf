// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text embedding capability
//!
//! The core depends only on the [`Embedder`] trait. Concrete embedders are
//! selected at startup by [`create_embedder`] from the configured model name:
//! - `hashing`: deterministic local feature-hashing embedder (no model files)
//! - anything else: ONNX sentence transformer loaded from the models directory

pub mod hashing;
pub mod onnx_model;
pub mod subword;
pub mod text;

pub use hashing::HashingEmbedder;
pub use onnx_model::OnnxEmbeddingModel;
pub use subword::{PretrainedSubwords, SubwordTokenizer, SubwordVocabulary, DEFAULT_VOCABULARY_WORDS};

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Factory key for the local hashing embedder
pub const HASHING_MODEL: &str = "hashing";

/// Errors produced while turning text into vectors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Nothing encodable remained after normalisation
    #[error("Text has no encodable content after normalization")]
    EmptyInput,

    /// The model produced a vector of the wrong size
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model produced NaN or infinite values
    #[error("Embedding contains non-finite values")]
    NonFinite,

    /// Tokenizer or runtime failure inside the model
    #[error("Embedding model failure: {0}")]
    Model(String),
}

impl EmbeddingError {
    pub fn error_code(&self) -> &'static str {
        match self {
            EmbeddingError::EmptyInput => "EMBEDDING_EMPTY_INPUT",
            EmbeddingError::DimensionMismatch { .. } => "EMBEDDING_DIMENSION_MISMATCH",
            EmbeddingError::NonFinite => "EMBEDDING_NON_FINITE",
            EmbeddingError::Model(_) => "EMBEDDING_MODEL_FAILURE",
        }
    }
}

/// Maps text to fixed-length vectors
///
/// Implementations must be deterministic for identical input and must fail
/// rather than return a degenerate (all-zero) vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text into a vector of [`Embedder::dimension`] floats
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Output dimension, fixed at construction
    fn dimension(&self) -> usize;

    /// Model name recorded alongside persisted indexes
    fn name(&self) -> &str;
}

/// Check a freshly produced vector before it reaches the index
pub(crate) fn check_vector(vector: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::NonFinite);
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(EmbeddingError::EmptyInput);
    }
    Ok(())
}

/// Build the embedder named by `model`
///
/// Any name other than [`HASHING_MODEL`] is loaded as an ONNX model from
/// `<models_dir>/<model>-onnx/`. When that fails the hashing embedder is used
/// instead so the assistant can still answer from the knowledge base.
pub async fn create_embedder(
    model: &str,
    models_dir: &Path,
    hashing_dimension: usize,
) -> Arc<dyn Embedder> {
    if model == HASHING_MODEL {
        info!("Using hashing embedder ({} dimensions)", hashing_dimension);
        return Arc::new(HashingEmbedder::new(hashing_dimension));
    }

    let model_dir = models_dir.join(format!("{}-onnx", model));
    let model_path = model_dir.join("model.onnx");
    let tokenizer_path = model_dir.join("tokenizer.json");

    match OnnxEmbeddingModel::new(model, &model_path, &tokenizer_path).await {
        Ok(onnx) => {
            info!(
                "Loaded ONNX embedding model {} ({} dimensions)",
                model,
                onnx.dimension()
            );
            Arc::new(onnx)
        }
        Err(e) => {
            warn!(
                "Failed to load embedding model {} from {}: {:#}; falling back to hashing embedder",
                model,
                model_dir.display(),
                e
            );
            Arc::new(HashingEmbedder::new(hashing_dimension))
        }
    }
}
