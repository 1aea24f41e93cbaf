// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX sentence-transformer embedder
//!
//! Wraps ONNX Runtime for models such as all-MiniLM-L6-v2:
//! - BERT tokenization, truncated to the model's sequence limit
//! - Mean pooling over token embeddings weighted by the attention mask
//! - L2 normalization so cosine similarity equals the dot product
//!
//! Inference is CPU-bound and runs on tokio's blocking pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ndarray::{Array2, Axis};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{check_vector, Embedder, EmbeddingError};

/// Sequence limit for MiniLM-family models
const MAX_SEQUENCE_LENGTH: usize = 256;

#[derive(Clone)]
pub struct OnnxEmbeddingModel {
    /// ONNX Runtime session; `run` needs exclusive access
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    /// Hidden size reported by the model's validation run
    dimension: usize,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingModel {
    /// Load the model and tokenizer, then probe the output dimension
    ///
    /// # Errors
    /// - model or tokenizer file missing or invalid
    /// - ONNX Runtime initialization failure
    /// - model output is not `[batch, seq_len, hidden]`
    pub async fn new(
        model_name: impl Into<String>,
        model_path: &Path,
        tokenizer_path: &Path,
    ) -> Result<Self> {
        let model_name = model_name.into();

        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }

        info!("Loading ONNX embedding model {} from {}", model_name, model_path.display());

        let model_path = model_path.to_path_buf();
        let tokenizer_path = tokenizer_path.to_path_buf();

        let (session, tokenizer, dimension) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut session = Session::builder()
                .context("Failed to create session builder")?
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .context("Failed to set CPU execution provider")?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .context("Failed to set optimization level")?
                .with_intra_threads(4)
                .context("Failed to set intra threads")?
                .commit_from_file(&model_path)
                .with_context(|| {
                    format!("Failed to load ONNX model from {}", model_path.display())
                })?;

            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

            let probe = run_pooled(&mut session, &tokenizer, "validation probe")?;
            Ok((session, tokenizer, probe.len()))
        })
        .await
        .context("Model loading task panicked")??;

        if dimension == 0 {
            anyhow::bail!("Model {} produced an empty embedding", model_name);
        }

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Tokenize, run the model and mean-pool into an L2-normalised vector
fn run_pooled(session: &mut Session, tokenizer: &Tokenizer, text: &str) -> Result<Vec<f32>> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

    let take = encoding.get_ids().len().min(MAX_SEQUENCE_LENGTH);
    let input_ids: Vec<i64> = encoding.get_ids()[..take].iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding.get_attention_mask()[..take]
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = vec![0i64; take];
    let pooling_mask = attention_mask.clone();

    let input_ids_array = Array2::from_shape_vec((1, take), input_ids)
        .context("Failed to create input_ids array")?;
    let attention_mask_array = Array2::from_shape_vec((1, take), attention_mask)
        .context("Failed to create attention_mask array")?;
    let token_type_ids_array = Array2::from_shape_vec((1, take), token_type_ids)
        .context("Failed to create token_type_ids array")?;

    let outputs = session.run(ort::inputs![
        "input_ids" => Value::from_array(input_ids_array)?,
        "attention_mask" => Value::from_array(attention_mask_array)?,
        "token_type_ids" => Value::from_array(token_type_ids_array)?
    ])?;

    // Token-level output: [batch, seq_len, hidden]
    let output = outputs[0]
        .try_extract_array::<f32>()
        .context("Failed to extract output tensor")?;
    if output.shape().len() != 3 {
        anyhow::bail!(
            "Model outputs unexpected shape {:?} (expected [batch, seq_len, hidden])",
            output.shape()
        );
    }

    let tokens = output.index_axis(Axis(0), 0);
    let seq_len = tokens.shape()[0];
    let hidden = tokens.shape()[1];

    let mut pooled = vec![0.0f32; hidden];
    let mut mask_total = 0.0f32;
    for i in 0..seq_len.min(pooling_mask.len()) {
        let weight = pooling_mask[i] as f32;
        mask_total += weight;
        for j in 0..hidden {
            pooled[j] += tokens[[i, j]] * weight;
        }
    }
    for value in &mut pooled {
        *value /= mask_total.max(1e-9);
    }

    let norm = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut pooled {
            *value /= norm;
        }
    }

    Ok(pooled)
}

#[async_trait]
impl Embedder for OnnxEmbeddingModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        let vector = tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| EmbeddingError::Model("ONNX session lock poisoned".to_string()))?;
            run_pooled(&mut guard, &tokenizer, &text)
                .map_err(|e| EmbeddingError::Model(format!("{:#}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Model(format!("Embedding task failed: {}", e)))??;

        check_vector(&vector, self.dimension)?;
        debug!("Embedded text into {}D vector with {}", vector.len(), self.model_name);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
