// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic feature-hashing embedder
//!
//! Each retrieval term is hashed with SHA-256 into one bucket with a sign, so
//! texts sharing terms get a positive cosine similarity. The output is
//! L2-normalised and identical across runs and platforms.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::text::index_terms;
use super::{check_vector, Embedder, EmbeddingError, HASHING_MODEL};

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous embedding; the work is small enough to run inline
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let terms = index_terms(text);
        if terms.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for term in &terms {
            let digest = Sha256::digest(term.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Every term cancelled out in shared buckets
            return Err(EmbeddingError::EmptyInput);
        }
        for value in &mut vector {
            *value /= norm;
        }

        check_vector(&vector, self.dimension)?;
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        HASHING_MODEL
    }
}
