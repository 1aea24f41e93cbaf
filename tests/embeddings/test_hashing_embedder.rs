// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::embeddings::{Embedder, EmbeddingError, HashingEmbedder};
use remodel_rag::vector::Embedding;

#[tokio::test]
async fn test_deterministic() {
    let embedder = HashingEmbedder::new(384);
    let a = embedder.embed("Walk-in shower conversions").await.unwrap();
    let b = embedder.embed("Walk-in shower conversions").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 384);
}

#[tokio::test]
async fn test_unit_length() {
    let embedder = HashingEmbedder::new(384);
    let vector = embedder.embed("Custom cabinetry and quartz countertops").await.unwrap();
    let magnitude = Embedding::new(vector).magnitude();
    assert!((magnitude - 1.0).abs() < 1e-5, "magnitude = {}", magnitude);
}

#[tokio::test]
async fn test_empty_input_is_an_error() {
    let embedder = HashingEmbedder::new(384);
    for text in ["", "   ", "?!", "the and of"] {
        assert!(
            matches!(embedder.embed(text).await, Err(EmbeddingError::EmptyInput)),
            "{:?} should not embed",
            text
        );
    }
}

#[tokio::test]
async fn test_inflections_share_features() {
    let embedder = HashingEmbedder::new(384);
    let a = Embedding::new(embedder.embed("bathroom remodels").await.unwrap());
    let b = Embedding::new(embedder.embed("Bathroom remodeling").await.unwrap());
    assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_batch_matches_single() {
    let embedder = HashingEmbedder::new(128);
    let texts = vec!["deck staining".to_string(), "fence repair".to_string()];
    let batch = embedder.embed_batch(&texts).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1], embedder.embed("fence repair").await.unwrap());
}
