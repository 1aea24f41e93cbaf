// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::cli::commands::build_pipeline;
use remodel_rag::config::RagConfig;
use remodel_rag::vector::KnowledgeEntry;

fn offline_config() -> RagConfig {
    let mut config = RagConfig::local();
    config.use_image_analysis = true;
    config
}

#[tokio::test]
async fn test_bathroom_question_answered_from_bathroom_passage() {
    let pipeline = build_pipeline(&offline_config()).await.unwrap();
    pipeline
        .rebuild(vec![
            KnowledgeEntry::new("We offer full bathroom remodels including tile and fixtures."),
            KnowledgeEntry::new("Kitchen remodeling includes cabinetry and countertops."),
        ])
        .await
        .unwrap();

    let results = pipeline
        .search("Tell me about bathroom remodeling", 2)
        .await
        .unwrap();
    assert!(results[0].document.text.contains("bathroom"));
    assert!(results[0].score > results[1].score);

    let response = pipeline
        .handle_text_query(None, "Tell me about bathroom remodeling")
        .await
        .unwrap();
    assert!(response
        .answer
        .starts_with("Here is what we can tell you: We offer full bathroom remodels"));
    assert!(response.answer.chars().count() <= 1200);
}

#[tokio::test]
async fn test_image_question_with_heuristic_analyzer() {
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    let pipeline = build_pipeline(&offline_config()).await.unwrap();
    pipeline
        .rebuild(vec![
            KnowledgeEntry::new("White subway tile brightens small bathrooms."),
            KnowledgeEntry::new("Dark wood cabinets suit traditional kitchens."),
        ])
        .await
        .unwrap();

    let mut photo = Vec::new();
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(40, 40, Rgb([240u8, 240, 240])))
        .write_to(&mut Cursor::new(&mut photo), ImageFormat::Png)
        .unwrap();

    let response = pipeline
        .handle_image_query(None, "How can I update this space?", &photo)
        .await
        .unwrap();
    assert!(response
        .observations
        .iter()
        .any(|o| o.label == "white surfaces"));
    assert!(!response.answer.is_empty());
}
