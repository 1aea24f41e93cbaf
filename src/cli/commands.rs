// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::conversation::{ConversationLog, ConversationStore};
use crate::embeddings::{create_embedder, PretrainedSubwords, SubwordTokenizer, SubwordVocabulary};
use crate::rag::{
    create_generator, load_knowledge_base, BudgetUnit, ContextAssembler, RagPipeline,
    ResponseGenerator,
};
use crate::vector::{IndexStorage, VectorIndex};
use crate::vision::HeuristicRoomAnalyzer;

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Knowledge base file (defaults to KNOWLEDGE_BASE_PATH)
    #[arg(long)]
    pub path: Option<PathBuf>,
}

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    pub query: String,

    /// Number of results (defaults to TOP_K)
    #[arg(short, long)]
    pub k: Option<usize>,
}

/// Arguments for the ask command
#[derive(Args, Debug)]
pub struct AskArgs {
    pub query: String,

    /// Photo of the room the question is about
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Continue an existing conversation
    #[arg(long)]
    pub conversation: Option<String>,
}

/// Arguments for the history command
#[derive(Args, Debug)]
pub struct HistoryArgs {
    pub conversation_id: String,
}

/// Wire up the pipeline described by `config`
pub async fn build_pipeline(config: &RagConfig) -> Result<RagPipeline> {
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let embedder = create_embedder(
        &config.embedding_model,
        &config.embedding_models_dir,
        config.embedding_dimension,
    )
    .await;

    let (index, conversations) = if config.persistence.enabled {
        let index = VectorIndex::open(
            embedder,
            IndexStorage::new(&config.persistence.vector_db_path),
        )
        .await;
        let conversations =
            ConversationStore::open(ConversationLog::new(&config.persistence.conversation_log_path))
                .await
                .context("Failed to open conversation log")?;
        (index, conversations)
    } else {
        (VectorIndex::new(embedder), ConversationStore::new())
    };

    let backend = create_generator(
        &config.generation.backend,
        &config.generation.endpoint,
        &config.generation.model,
        config.generation.api_key.as_deref(),
    )?;
    let generator =
        ResponseGenerator::with_system_prompt(backend, config.generation.system_prompt.clone());

    let assembler = match config.budget_unit {
        BudgetUnit::Subwords => ContextAssembler::with_subwords(
            config.assembly_config(),
            subword_tokenizer(config, &index).await,
        ),
        _ => ContextAssembler::new(config.assembly_config()),
    };

    let mut pipeline = RagPipeline::new(
        Arc::new(index),
        Arc::new(conversations),
        assembler,
        generator,
        config.pipeline_config(),
    );
    if config.use_image_analysis {
        pipeline = pipeline.with_extractor(Arc::new(HeuristicRoomAnalyzer::new()));
    }

    Ok(pipeline)
}

/// Tokenizer for subword budgets
///
/// A configured `tokenizer.json` wins. Otherwise a vocabulary is learned from
/// the knowledge base file, or from a loaded index snapshot when the file is
/// missing.
async fn subword_tokenizer(config: &RagConfig, index: &VectorIndex) -> Arc<dyn SubwordTokenizer> {
    if let Some(path) = &config.subword_tokenizer_path {
        match PretrainedSubwords::from_file(path) {
            Ok(tokenizer) => {
                info!("Using subword tokenizer from {}", path.display());
                return Arc::new(tokenizer);
            }
            Err(e) => warn!("{:#}; learning a vocabulary instead", e),
        }
    }

    let size = config.subword_vocabulary_size;
    let vocabulary = match tokio::fs::read_to_string(&config.knowledge_base_path).await {
        Ok(text) => SubwordVocabulary::build([text.as_str()], size),
        Err(_) => match index.snapshot().await {
            Some(snapshot) => {
                SubwordVocabulary::build(snapshot.documents().iter().map(|d| d.text.as_str()), size)
            }
            None => {
                warn!("No knowledge base available, subword budgets count characters of every word");
                SubwordVocabulary::default()
            }
        },
    };
    info!("Learned subword vocabulary of {} words", vocabulary.len());
    Arc::new(vocabulary)
}

/// Build the index from the configured knowledge base unless a snapshot was loaded
async fn ensure_index(pipeline: &RagPipeline, config: &RagConfig) -> Result<()> {
    if pipeline.index().is_built().await {
        return Ok(());
    }
    let entries = load_knowledge_base(&config.knowledge_base_path, config.kb_chunk_size).await?;
    pipeline.rebuild(entries).await?;
    Ok(())
}

pub async fn ingest(args: IngestArgs, config: &RagConfig) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let path = args.path.unwrap_or_else(|| config.knowledge_base_path.clone());

    let entries = load_knowledge_base(&path, config.kb_chunk_size).await?;
    let stats = pipeline.rebuild(entries).await?;

    println!(
        "Indexed {} passages ({}D, {}) from {}",
        stats.document_count,
        stats.dimension,
        stats.embedder,
        path.display()
    );
    if !config.persistence.enabled {
        warn!("Persistence disabled, the index only lived for this command");
    }
    Ok(())
}

pub async fn search(args: SearchArgs, config: &RagConfig) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    ensure_index(&pipeline, config).await?;

    let k = args.k.unwrap_or(config.top_k);
    let results = pipeline.search(&args.query, k).await?;
    for (rank, result) in results.iter().enumerate() {
        let section = result
            .document
            .metadata
            .get("section")
            .map(String::as_str)
            .unwrap_or("-");
        println!(
            "{}. [{:.3}] {} ({})\n   {}",
            rank + 1,
            result.score,
            result.document.id,
            section,
            result.document.text
        );
    }
    Ok(())
}

pub async fn ask(args: AskArgs, config: &RagConfig) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    ensure_index(&pipeline, config).await?;

    let conversation = args.conversation.as_deref();
    match args.image {
        Some(path) => {
            let image = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            let response = pipeline
                .handle_image_query(conversation, &args.query, &image)
                .await?;
            for observation in &response.observations {
                println!("  observed: {} ({:.2})", observation.label, observation.confidence);
            }
            println!("{}", response.answer);
            println!("\nconversation: {}", response.conversation_id);
        }
        None => {
            let response = pipeline.handle_text_query(conversation, &args.query).await?;
            println!("{}", response.answer);
            println!("\nconversation: {}", response.conversation_id);
        }
    }
    flush_conversations(&pipeline).await;
    Ok(())
}

pub async fn chat(config: &RagConfig) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    ensure_index(&pipeline, config).await?;

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation_id: Option<String> = None;

    stdout
        .write_all(b"Ask about our remodeling services. Type 'quit' to leave.\n")
        .await?;
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        match pipeline
            .handle_text_query(conversation_id.as_deref(), line)
            .await
        {
            Ok(response) => {
                stdout.write_all(response.answer.as_bytes()).await?;
                stdout.write_all(b"\n\n").await?;
                conversation_id = Some(response.conversation_id);
            }
            Err(e) => {
                stdout.write_all(e.user_message().as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        }
    }

    if let Some(id) = conversation_id {
        info!("Chat session ended for conversation {}", id);
    }
    flush_conversations(&pipeline).await;
    Ok(())
}

/// Drain the conversation log before the runtime shuts down
async fn flush_conversations(pipeline: &RagPipeline) {
    if let Err(e) = pipeline.conversations().flush().await {
        warn!("Failed to flush conversation log: {}", e);
    }
}

pub async fn history(args: HistoryArgs, config: &RagConfig) -> Result<()> {
    if !config.persistence.enabled {
        warn!("Persistence disabled, no earlier conversations are available");
    }
    let pipeline = build_pipeline(config).await?;
    let conversation = pipeline
        .conversation(&args.conversation_id)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    println!(
        "Conversation {} (started {})",
        conversation.id,
        conversation.created_at.to_rfc3339()
    );
    for turn in &conversation.turns {
        println!(
            "[{}] {}: {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.role,
            turn.text
        );
    }
    Ok(())
}
