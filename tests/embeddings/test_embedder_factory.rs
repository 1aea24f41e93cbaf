// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::embeddings::{create_embedder, HASHING_MODEL};

#[tokio::test]
async fn test_hashing_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = create_embedder(HASHING_MODEL, dir.path(), 96).await;
    assert_eq!(embedder.name(), HASHING_MODEL);
    assert_eq!(embedder.dimension(), 96);
}

#[tokio::test]
async fn test_missing_model_falls_back_to_hashing() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = create_embedder("all-MiniLM-L6-v2", dir.path(), 384).await;
    assert_eq!(embedder.name(), HASHING_MODEL);
    assert_eq!(embedder.embed("tile").await.unwrap().len(), 384);
}
