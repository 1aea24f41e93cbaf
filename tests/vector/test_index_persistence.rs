// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::embeddings::HashingEmbedder;
use remodel_rag::vector::{IndexStorage, KnowledgeEntry, VectorIndex};
use std::sync::Arc;

#[tokio::test]
async fn test_index_reloads_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let index = VectorIndex::open(
            Arc::new(HashingEmbedder::new(128)),
            IndexStorage::new(dir.path()),
        )
        .await;
        assert!(!index.is_built().await);
        index
            .build(vec![
                KnowledgeEntry::new("Gutter cleaning every spring").with_metadata("section", "Exterior"),
                KnowledgeEntry::new("Vinyl siding installation"),
            ])
            .await
            .unwrap();
    }

    let reopened = VectorIndex::open(
        Arc::new(HashingEmbedder::new(128)),
        IndexStorage::new(dir.path()),
    )
    .await;
    let stats = reopened.stats().await.unwrap();
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.dimension, 128);

    let results = reopened.search("gutter cleaning", 1).await.unwrap();
    assert_eq!(results[0].document.metadata["section"], "Exterior");
}

#[tokio::test]
async fn test_snapshot_from_other_dimension_ignored() {
    let dir = tempfile::tempdir().unwrap();

    let index = VectorIndex::open(
        Arc::new(HashingEmbedder::new(128)),
        IndexStorage::new(dir.path()),
    )
    .await;
    index
        .build(vec![KnowledgeEntry::new("Window replacement")])
        .await
        .unwrap();

    let reopened = VectorIndex::open(
        Arc::new(HashingEmbedder::new(64)),
        IndexStorage::new(dir.path()),
    )
    .await;
    assert!(!reopened.is_built().await);
}

#[tokio::test]
async fn test_build_survives_unwritable_storage() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the snapshot directory should be
    let blocker = dir.path().join("vector_db");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let index = VectorIndex::open(Arc::new(HashingEmbedder::new(128)), IndexStorage::new(&blocker)).await;
    let stats = index
        .build(vec![KnowledgeEntry::new("Deck staining and sealing")])
        .await
        .unwrap();
    assert_eq!(stats.document_count, 1);

    let results = index.search("deck staining", 1).await.unwrap();
    assert_eq!(results[0].document.text, "Deck staining and sealing");
    assert!(blocker.is_file());
}
