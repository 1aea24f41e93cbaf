// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use remodel_rag::conversation::{ConversationStore, Role};
use remodel_rag::embeddings::HashingEmbedder;
use remodel_rag::rag::pipeline::{GENERATION_FALLBACK_ANSWER, INSUFFICIENT_INFORMATION_ANSWER};
use remodel_rag::rag::{
    ContextAssembler, GenerationError, GenerationRequest, Generator, PipelineConfig, RagError,
    RagPipeline, ResponseGenerator, TemplateGenerator,
};
use remodel_rag::vector::{KnowledgeEntry, VectorIndex};
use remodel_rag::vision::{FeatureExtractor, ImageObservation, VisionError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FailingExtractor;

#[async_trait]
impl FeatureExtractor for FailingExtractor {
    async fn extract_features(&self, _image: &[u8]) -> Result<Vec<ImageObservation>, VisionError> {
        Err(VisionError::Extraction("model crashed".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct FixedExtractor(Vec<ImageObservation>);

#[async_trait]
impl FeatureExtractor for FixedExtractor {
    async fn extract_features(&self, _image: &[u8]) -> Result<Vec<ImageObservation>, VisionError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Fails the first `failures` calls, then echoes the query; records every request
struct FlakyGenerator {
    failures: usize,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FlakyGenerator {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for FlakyGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(GenerationError::Unavailable("connection refused".to_string()));
        }
        Ok(format!("Answer to: {}", request.query))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

async fn pipeline_with(generator: Arc<dyn Generator>) -> RagPipeline {
    let index = VectorIndex::new(Arc::new(HashingEmbedder::new(384)));
    index
        .build(vec![
            KnowledgeEntry::new("We offer full bathroom remodels including tile and fixtures."),
            KnowledgeEntry::new("Kitchen remodeling includes cabinetry and countertops."),
            KnowledgeEntry::new("Living room flooring options include hardwood and carpet."),
        ])
        .await
        .unwrap();

    RagPipeline::new(
        Arc::new(index),
        Arc::new(ConversationStore::new()),
        ContextAssembler::default(),
        ResponseGenerator::new(generator),
        PipelineConfig::default(),
    )
}

#[tokio::test]
async fn test_failing_extractor_gives_text_only_answer() {
    let pipeline = pipeline_with(Arc::new(TemplateGenerator::new()))
        .await
        .with_extractor(Arc::new(FailingExtractor));

    let response = pipeline
        .handle_image_query(None, "Tell me about bathroom remodeling", b"\x89PNG....")
        .await
        .unwrap();

    assert!(response.observations.is_empty());
    assert!(response.answer.contains("bathroom remodels"));

    let conversation = pipeline.conversation(&response.conversation_id).await.unwrap();
    assert_eq!(conversation.turns.len(), 2);
    assert!(conversation.turns[0].attachments.is_none());
}

#[tokio::test]
async fn test_image_observations_reach_prompt_and_turn() {
    let generator = Arc::new(FlakyGenerator::new(0));
    let pipeline = pipeline_with(generator.clone())
        .await
        .with_extractor(Arc::new(FixedExtractor(vec![
            ImageObservation::new("room:living_room", 0.9),
            ImageObservation::new("lighting:dim", 0.7),
        ])));

    let response = pipeline
        .handle_image_query(None, "What flooring would work here?", b"image")
        .await
        .unwrap();
    assert_eq!(response.observations.len(), 2);

    let requests = generator.requests.lock().unwrap();
    assert!(requests[0].prompt.contains("- room:living_room (confidence 0.90)"));
    assert_eq!(requests[0].room_type.as_deref(), Some("living_room"));
    assert!(requests[0].passages[0].contains("flooring"));
    drop(requests);

    let conversation = pipeline.conversation(&response.conversation_id).await.unwrap();
    assert_eq!(conversation.turns[0].attachments.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn test_no_extractor_configured() {
    let pipeline = pipeline_with(Arc::new(TemplateGenerator::new())).await;
    let response = pipeline
        .handle_image_query(None, "Kitchen ideas?", b"image")
        .await
        .unwrap();
    assert!(response.observations.is_empty());
}

#[tokio::test]
async fn test_generation_retried_with_half_length() {
    let generator = Arc::new(FlakyGenerator::new(1));
    let pipeline = pipeline_with(generator.clone()).await;

    let response = pipeline
        .handle_text_query(None, "Kitchen cabinetry?")
        .await
        .unwrap();
    assert_eq!(response.answer, "Answer to: Kitchen cabinetry?");

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].max_tokens, 300);
    assert_eq!(requests[1].max_tokens, 150);
}

#[tokio::test]
async fn test_generation_failure_falls_back() {
    let generator = Arc::new(FlakyGenerator::new(usize::MAX));
    let pipeline = pipeline_with(generator.clone()).await;

    let response = pipeline
        .handle_text_query(None, "Kitchen cabinetry?")
        .await
        .unwrap();
    assert_eq!(response.answer, GENERATION_FALLBACK_ANSWER);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    let conversation = pipeline.conversation(&response.conversation_id).await.unwrap();
    assert_eq!(conversation.turns[1].text, GENERATION_FALLBACK_ANSWER);
}

#[tokio::test]
async fn test_history_carried_into_prompt() {
    let generator = Arc::new(FlakyGenerator::new(0));
    let pipeline = pipeline_with(generator.clone()).await;

    let first = pipeline
        .handle_text_query(None, "Do you remodel kitchens?")
        .await
        .unwrap();
    let second = pipeline
        .handle_text_query(Some(&first.conversation_id), "What about countertops?")
        .await
        .unwrap();
    assert_eq!(second.conversation_id, first.conversation_id);

    let requests = generator.requests.lock().unwrap();
    assert!(requests[1].prompt.contains("User: Do you remodel kitchens?"));
    assert!(requests[1]
        .prompt
        .contains("Assistant: Answer to: Do you remodel kitchens?"));
    drop(requests);

    let conversation = pipeline.conversation(&first.conversation_id).await.unwrap();
    let roles: Vec<Role> = conversation.turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn test_unknown_conversation_starts_new_one() {
    let pipeline = pipeline_with(Arc::new(TemplateGenerator::new())).await;
    let response = pipeline
        .handle_text_query(Some("stale-id-from-yesterday"), "Kitchen remodeling?")
        .await
        .unwrap();
    assert_ne!(response.conversation_id, "stale-id-from-yesterday");
    assert_eq!(
        pipeline
            .conversation(&response.conversation_id)
            .await
            .unwrap()
            .turns
            .len(),
        2
    );
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let pipeline = pipeline_with(Arc::new(TemplateGenerator::new()))
        .await
        .with_extractor(Arc::new(FailingExtractor));

    assert!(matches!(
        pipeline.handle_text_query(None, "").await,
        Err(RagError::Validation(_))
    ));
    assert!(matches!(
        pipeline.handle_image_query(None, "  ", b"image").await,
        Err(RagError::Validation(_))
    ));
    assert!(pipeline.conversations().is_empty().await);
}

#[tokio::test]
async fn test_unencodable_query_degrades() {
    let pipeline = pipeline_with(Arc::new(TemplateGenerator::new())).await;
    let response = pipeline.handle_text_query(None, "what is it?").await.unwrap();
    assert_eq!(response.answer, INSUFFICIENT_INFORMATION_ANSWER);
}
