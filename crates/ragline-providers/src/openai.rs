//! OpenAI-compatible embedding and chat completion backend.
//!
//! Works against any server exposing `/embeddings` and `/chat/completions`
//! in the OpenAI wire format.

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

const PROVIDER_NAME: &str = "openai";

/// OpenAI provider serving both embeddings and generation.
#[derive(Clone)]
pub struct OpenAiProvider {
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

impl OpenAiProvider {
    /// Build a provider from the `[llm]` settings.
    ///
    /// Fails if no API key is configured.
    pub fn from_config(config: &LlmConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let api_key = config.openai.api_key.clone().ok_or_else(|| {
            ProviderError::Configuration("llm.openai.api_key is required for the openai backend".to_string())
        })?;

        let client = Client::builder()
            .timeout(retry.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        debug!(
            "Initialized OpenAI provider: generation={}, embedding={} ({} dims)",
            config.generation_model_id, config.embedding_model_id, config.embedding_model_size
        );

        Ok(Self {
            client,
            api_key,
            base_url: config.openai.api_url.trim_end_matches('/').to_string(),
            generation_model: config.generation_model_id.clone(),
            embedding_model: config.embedding_model_id.clone(),
            embedding_size: config.embedding_model_size,
            input_max_characters: config.input_max_characters,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            retry,
        })
    }

    /// Set a custom base URL (useful for proxies and compatible servers).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn chat_body(&self, prompt: &str, history: &[Message]) -> ChatCompletionRequest {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|m| ChatMessage {
                role: role_name(m.role),
                content: m.content.clone(),
            })
            .collect();

        let user = self.construct_message(prompt, MessageRole::User);
        messages.push(ChatMessage {
            role: role_name(user.role),
            content: user.content,
        });

        ChatCompletionRequest {
            model: self.generation_model.clone(),
            messages,
            max_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_text(
        &self,
        text: &str,
        _purpose: DocumentType,
    ) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: vec![text],
        };

        let response: EmbeddingResponse = with_retry(&self.retry, PROVIDER_NAME, "embed", || {
            post_json(&self.client, PROVIDER_NAME, &url, &self.api_key, &body)
        })
        .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
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
impl GenerationProvider for OpenAiProvider {
    fn construct_message(&self, text: &str, role: MessageRole) -> Message {
        Message::new(role, process_text(text, self.input_max_characters))
    }

    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.chat_body(prompt, history);

        debug!(
            "Sending chat completion with {} messages to {}",
            body.messages.len(),
            self.generation_model
        );

        let response: ChatCompletionResponse =
            with_retry(&self.retry, PROVIDER_NAME, "generate", || {
                post_json(&self.client, PROVIDER_NAME, &url, &self.api_key, &body)
            })
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER_NAME, "No completion returned"))
    }

    fn model_name(&self) -> &str {
        &self.generation_model
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
