// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// RAG (Retrieval-Augmented Generation) module
// Context assembly, answer generation and the query entry points

pub mod assembler;
pub mod errors;
pub mod generator;
pub mod knowledge_base;
pub mod openai_client;
pub mod pipeline;

pub use assembler::{AssemblyConfig, BudgetUnit, ContextAssembler, PromptContext};
pub use errors::{GenerationError, RagError};
pub use generator::{
    create_generator, GenerationRequest, Generator, ResponseGenerator, TemplateGenerator,
};
pub use knowledge_base::{load_knowledge_base, parse_knowledge_base};
pub use openai_client::OpenAiGenerator;
pub use pipeline::{ImageQueryResponse, PipelineConfig, RagPipeline, TextQueryResponse};
