// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Runtime configuration loaded from environment variables

use std::env;
use std::path::PathBuf;
use tracing::warn;

use crate::embeddings::{DEFAULT_VOCABULARY_WORDS, HASHING_MODEL};
use crate::rag::assembler::{AssemblyConfig, BudgetUnit};
use crate::rag::generator::{DEFAULT_SYSTEM_PROMPT, OPENAI_BACKEND, TEMPLATE_BACKEND};
use crate::rag::pipeline::PipelineConfig;

/// Configuration for the assistant core and its binary
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Embedder factory key (`hashing` for the local embedder)
    pub embedding_model: String,
    /// Root directory of ONNX embedding models
    pub embedding_models_dir: PathBuf,
    /// Vector size of the hashing embedder
    pub embedding_dimension: usize,
    pub generation: GenerationConfig,
    /// Retrieval depth
    pub top_k: usize,
    pub context_budget: usize,
    pub budget_unit: BudgetUnit,
    /// `tokenizer.json` used for subword budgets; unset learns a vocabulary
    /// from the knowledge base
    pub subword_tokenizer_path: Option<PathBuf>,
    /// Words kept by the learned subword vocabulary
    pub subword_vocabulary_size: usize,
    pub min_fragment: usize,
    pub history_turns: usize,
    /// Observations below this confidence are not used as search terms
    pub min_observation_confidence: f32,
    pub use_image_analysis: bool,
    pub persistence: PersistenceConfig,
    pub knowledge_base_path: PathBuf,
    /// Maximum characters per knowledge base chunk
    pub kb_chunk_size: usize,
    pub log_level: String,
}

/// Generation backend configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// `template` or `openai`
    pub backend: String,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Answer length limit in characters
    pub max_response_chars: usize,
    pub system_prompt: String,
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub vector_db_path: PathBuf,
    pub conversation_log_path: PathBuf,
}

pub const DEFAULT_LOG_LEVEL: &str = "info";

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(value) = lookup(key) else {
        return default;
    };
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Ignoring invalid {}={:?}, using the default", key, value);
            default
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"))
        .unwrap_or(default)
}

impl RagConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup; unset or unparsable values use defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        Self {
            embedding_model: text("EMBEDDING_MODEL", defaults.embedding_model),
            embedding_models_dir: lookup("EMBEDDING_MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.embedding_models_dir),
            embedding_dimension: parsed(&lookup, "EMBEDDING_DIMENSION", defaults.embedding_dimension),
            generation: GenerationConfig {
                backend: text("GENERATION_BACKEND", defaults.generation.backend).to_lowercase(),
                endpoint: text("GENERATION_ENDPOINT", defaults.generation.endpoint),
                model: text("GENERATION_MODEL", defaults.generation.model),
                api_key: lookup("GENERATION_API_KEY").filter(|k| !k.is_empty()),
                temperature: parsed(&lookup, "TEMPERATURE", defaults.generation.temperature),
                max_response_chars: parsed(
                    &lookup,
                    "MAX_RESPONSE_CHARS",
                    defaults.generation.max_response_chars,
                ),
                system_prompt: text("SYSTEM_PROMPT", defaults.generation.system_prompt),
            },
            top_k: parsed(&lookup, "TOP_K", defaults.top_k),
            context_budget: parsed(&lookup, "CONTEXT_BUDGET", defaults.context_budget),
            budget_unit: parsed(&lookup, "BUDGET_UNIT", defaults.budget_unit),
            subword_tokenizer_path: lookup("SUBWORD_TOKENIZER_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            subword_vocabulary_size: parsed(
                &lookup,
                "SUBWORD_VOCABULARY_SIZE",
                defaults.subword_vocabulary_size,
            ),
            min_fragment: parsed(&lookup, "MIN_FRAGMENT", defaults.min_fragment),
            history_turns: parsed(&lookup, "HISTORY_TURNS", defaults.history_turns),
            min_observation_confidence: parsed(
                &lookup,
                "MIN_OBSERVATION_CONFIDENCE",
                defaults.min_observation_confidence,
            ),
            use_image_analysis: flag(&lookup, "USE_IMAGE_ANALYSIS", defaults.use_image_analysis),
            persistence: PersistenceConfig {
                enabled: flag(&lookup, "PERSISTENCE_ENABLED", defaults.persistence.enabled),
                vector_db_path: lookup("VECTOR_DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.persistence.vector_db_path),
                conversation_log_path: lookup("CONVERSATION_LOG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.persistence.conversation_log_path),
            },
            knowledge_base_path: lookup("KNOWLEDGE_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.knowledge_base_path),
            kb_chunk_size: parsed(&lookup, "KB_CHUNK_SIZE", defaults.kb_chunk_size),
            log_level: text("LOG_LEVEL", defaults.log_level),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding_dimension == 0 {
            return Err("Embedding dimension must be greater than 0".to_string());
        }
        if self.top_k == 0 {
            return Err("TOP_K must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.generation.temperature) {
            return Err(format!(
                "Temperature must be within [0, 1], got {}",
                self.generation.temperature
            ));
        }
        if self.generation.max_response_chars == 0 {
            return Err("Maximum response length must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_observation_confidence) {
            return Err("Observation confidence threshold must be within [0, 1]".to_string());
        }
        if self.kb_chunk_size == 0 {
            return Err("Knowledge base chunk size must be greater than 0".to_string());
        }
        match self.generation.backend.as_str() {
            TEMPLATE_BACKEND | OPENAI_BACKEND => Ok(()),
            other => Err(format!("Unknown generation backend: {}", other)),
        }
    }

    pub fn assembly_config(&self) -> AssemblyConfig {
        AssemblyConfig {
            unit: self.budget_unit,
            min_fragment: self.min_fragment,
            max_history_turns: self.history_turns,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            top_k: self.top_k,
            context_budget: self.context_budget,
            temperature: self.generation.temperature,
            max_response_chars: self.generation.max_response_chars,
            min_observation_confidence: self.min_observation_confidence,
            history_turns: self.history_turns,
        }
    }

    /// Configuration for offline use: hashing embedder and template answers
    pub fn local() -> Self {
        Self {
            embedding_model: HASHING_MODEL.to_string(),
            ..Self::default()
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_models_dir: PathBuf::from("./models"),
            embedding_dimension: 384,
            generation: GenerationConfig {
                backend: TEMPLATE_BACKEND.to_string(),
                endpoint: "http://localhost:8000".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                temperature: 0.7,
                max_response_chars: 1200,
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
            top_k: 4,
            context_budget: 2000,
            budget_unit: BudgetUnit::Characters,
            subword_tokenizer_path: None,
            subword_vocabulary_size: DEFAULT_VOCABULARY_WORDS,
            min_fragment: 80,
            history_turns: 6,
            min_observation_confidence: 0.5,
            use_image_analysis: true,
            persistence: PersistenceConfig {
                enabled: false,
                vector_db_path: PathBuf::from("./vector_db"),
                conversation_log_path: PathBuf::from("./logs/conversations.jsonl"),
            },
            knowledge_base_path: PathBuf::from("input.txt"),
            kb_chunk_size: 800,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}
