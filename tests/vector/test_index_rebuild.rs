// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::embeddings::HashingEmbedder;
use remodel_rag::vector::{KnowledgeEntry, VectorIndex, VectorIndexError};
use std::sync::Arc;
use std::time::Duration;

fn generation(marker: &str) -> Vec<KnowledgeEntry> {
    (0..20)
        .map(|i| {
            KnowledgeEntry::new(format!(
                "{} remodeling passage {} about tile cabinets flooring",
                marker, i
            ))
            .with_metadata("generation", marker)
        })
        .collect()
}

#[tokio::test]
async fn test_rebuild_replaces_previous_index() {
    let index = VectorIndex::new(Arc::new(HashingEmbedder::new(256)));
    index.build(generation("alpha")).await.unwrap();
    index.build(generation("bravo")).await.unwrap();

    let results = index.search("tile", 50).await.unwrap();
    assert_eq!(results.len(), 20);
    assert!(results
        .iter()
        .all(|r| r.document.metadata["generation"] == "bravo"));
}

#[tokio::test]
async fn test_failed_build_keeps_previous_snapshot() {
    let index = VectorIndex::new(Arc::new(HashingEmbedder::new(256)));
    let stats = index.build(generation("alpha")).await.unwrap();
    assert_eq!(stats.document_count, 20);

    assert!(matches!(
        index.build(Vec::new()).await,
        Err(VectorIndexError::NoDocuments)
    ));
    // An entry with nothing encodable aborts the whole build
    let mut broken = generation("bravo");
    broken.push(KnowledgeEntry::new("the of and"));
    assert!(index.build(broken).await.is_err());

    let results = index.search("tile", 3).await.unwrap();
    assert!(results
        .iter()
        .all(|r| r.document.metadata["generation"] == "alpha"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rebuild_during_search_never_mixes_snapshots() {
    let index = Arc::new(VectorIndex::new(Arc::new(HashingEmbedder::new(256))));
    index.build(generation("alpha")).await.unwrap();

    let mut searchers = Vec::new();
    for _ in 0..4 {
        let index = index.clone();
        searchers.push(tokio::spawn(async move {
            for _ in 0..100 {
                let results = index.search("tile cabinets", 20).await.unwrap();
                let first = results[0].document.metadata["generation"].clone();
                assert!(results
                    .iter()
                    .all(|r| r.document.metadata["generation"] == first));
                tokio::task::yield_now().await;
            }
        }));
    }

    let builder = {
        let index = index.clone();
        tokio::spawn(async move {
            for round in 0..20 {
                let marker = if round % 2 == 0 { "bravo" } else { "alpha" };
                index.build(generation(marker)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    for searcher in searchers {
        searcher.await.unwrap();
    }
    builder.await.unwrap();
}
