// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::embeddings::HashingEmbedder;
use remodel_rag::rag::{load_knowledge_base, parse_knowledge_base};
use remodel_rag::vector::VectorIndex;
use std::sync::Arc;

const KNOWLEDGE_BASE: &str = "\
# Company
Hammer & Hearth Remodeling has served the valley since 1998. We are licensed, bonded and insured.

# Bathrooms
We offer full bathroom remodels including tile and fixtures.

Curbless showers are available for accessibility projects.

# Kitchens
Kitchen remodeling includes cabinetry and countertops.
";

#[test]
fn test_sections_recorded() {
    let entries = parse_knowledge_base(KNOWLEDGE_BASE, "input.txt", 800);
    let sections: Vec<&str> = entries
        .iter()
        .map(|e| e.metadata["section"].as_str())
        .collect();
    assert_eq!(sections, vec!["Company", "Bathrooms", "Bathrooms", "Kitchens"]);
}

#[tokio::test]
async fn test_loaded_file_feeds_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.txt");
    std::fs::write(&path, KNOWLEDGE_BASE).unwrap();

    let entries = load_knowledge_base(&path, 800).await.unwrap();
    let index = VectorIndex::new(Arc::new(HashingEmbedder::new(384)));
    let stats = index.build(entries).await.unwrap();
    assert_eq!(stats.document_count, 4);

    let results = index.search("curbless accessibility showers", 1).await.unwrap();
    assert_eq!(results[0].document.metadata["section"], "Bathrooms");
    assert_eq!(results[0].document.metadata["source"], "input.txt");
}
