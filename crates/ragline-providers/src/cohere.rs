//! Cohere embedding and chat backend.
//!
//! Cohere's embed endpoint distinguishes documents from queries through
//! `input_type`, so [`DocumentType`] is forwarded rather than ignored.

use async_trait::async_trait;
use ragline_config::LlmConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::post_json;
use crate::retry::{with_retry, RetryPolicy};
use crate::{
    process_text, DocumentType, EmbeddingProvider, GenerationProvider, Message, MessageRole,
    ProviderError,
};

const PROVIDER_NAME: &str = "cohere";

/// Cohere provider serving both embeddings and generation.
#[derive(Clone)]
pub struct CohereProvider {
    client: Client,
    api_key: String,
    base_url: String,
    generation_model: String,
    embedding_model: String,
    embedding_size: usize,
    input_max_characters: usize,
    max_output_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl CohereProvider {
    pub fn from_config(config: &LlmConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let api_key = config.cohere.api_key.clone().ok_or_else(|| {
            ProviderError::Configuration("llm.cohere.api_key is required for the cohere backend".to_string())
        })?;

        let client = Client::builder()
            .timeout(retry.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.cohere.api_url.trim_end_matches('/').to_string(),
            generation_model: config.generation_model_id.clone(),
            embedding_model: config.embedding_model_id.clone(),
            embedding_size: config.embedding_model_size,
            input_max_characters: config.input_max_characters,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            retry,
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn chat_body(&self, prompt: &str, history: &[Message]) -> ChatRequest {
        ChatRequest {
            model: self.generation_model.clone(),
            chat_history: history
                .iter()
                .map(|m| ChatTurn {
                    role: role_name(m.role),
                    message: m.content.clone(),
                })
                .collect(),
            message: process_text(prompt, self.input_max_characters),
            max_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "SYSTEM",
        MessageRole::User => "USER",
        MessageRole::Assistant => "CHATBOT",
    }
}

fn input_type(purpose: DocumentType) -> &'static str {
    match purpose {
        DocumentType::Document => "search_document",
        DocumentType::Query => "search_query",
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: Vec<&'a str>,
    input_type: &'static str,
    embedding_types: [&'static str; 1],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbedVectors,
}

#[derive(Deserialize)]
struct EmbedVectors {
    float: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatTurn {
    role: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    chat_history: Vec<ChatTurn>,
    message: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    text: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    async fn embed_text(
        &self,
        text: &str,
        purpose: DocumentType,
    ) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.embedding_model,
            texts: vec![text],
            input_type: input_type(purpose),
            embedding_types: ["float"],
        };

        let response: EmbedResponse = with_retry(&self.retry, PROVIDER_NAME, "embed", || {
            post_json(&self.client, PROVIDER_NAME, &url, &self.api_key, &body)
        })
        .await?;

        response
            .embeddings
            .float
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER_NAME, "No embedding returned"))
    }

    fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[async_trait]
impl GenerationProvider for CohereProvider {
    fn construct_message(&self, text: &str, role: MessageRole) -> Message {
        Message::new(role, process_text(text, self.input_max_characters))
    }

    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, ProviderError> {
        let url = format!("{}/chat", self.base_url);
        let body = self.chat_body(prompt, history);

        debug!(
            "Sending Cohere chat with {} history turns to {}",
            body.chat_history.len(),
            self.generation_model
        );

        let response: ChatResponse = with_retry(&self.retry, PROVIDER_NAME, "generate", || {
            post_json(&self.client, PROVIDER_NAME, &url, &self.api_key, &body)
        })
        .await?;

        response
            .text
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER_NAME, "No text returned"))
    }

    fn model_name(&self) -> &str {
        &self.generation_model
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
