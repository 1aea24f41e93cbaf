// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generation backend for OpenAI-compatible chat completion endpoints

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::errors::GenerationError;
use super::generator::{GenerationRequest, Generator};

// --- OpenAI-compatible serde structs ---

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for a chat completion service
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model_name: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(endpoint: &str, model_name: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Generation client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Check if the endpoint is reachable
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Generation health check failed: {}", e);
                false
            }
        }
    }

    fn chat_request<'a>(&'a self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model_name,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let start = std::time::Instant::now();

        let mut http = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&self.chat_request(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Generation endpoint returned {}: {}", status, body);
            return Err(GenerationError::Unavailable(format!("HTTP {}", status)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("malformed response: {}", e)))?;

        let tokens_used = chat_response.usage.map(|u| u.total_tokens).unwrap_or(0);
        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)?;

        debug!(
            "Chat completion: {} tokens in {}ms",
            tokens_used,
            start.elapsed().as_millis()
        );
        Ok(text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
