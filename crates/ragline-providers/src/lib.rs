//! Provider abstractions for ragline.
//!
//! Three capabilities are defined here, each behind a single trait:
//! - [`EmbeddingProvider`]: text to fixed-length vectors
//! - [`GenerationProvider`]: chat-style text generation
//! - [`VectorStoreProvider`]: named collections of vectors with similarity search
//!
//! Concrete backends form a closed set ([`LlmBackend`], [`VectorDbBackend`])
//! chosen once at startup through the [`ProviderRegistry`]. Every network
//! call goes through [`retry::with_retry`], which bounds it with a timeout
//! and retries transient failures with exponential backoff.

pub mod cohere;
pub mod error;
mod http;
pub mod memory;
pub mod openai;
pub mod qdrant;
pub mod registry;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::ProviderError;
pub use memory::MemoryVectorStore;
pub use registry::{LlmBackend, ProviderRegistry, VectorDbBackend};
pub use retry::RetryPolicy;

/// Free-form per-document attributes carried alongside chunk text.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// What an embedding will be used for.
///
/// Backends with asymmetric encoders embed documents and queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Document,
    Query,
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: String) -> Self {
        Self { role, content }
    }
}

/// Description of a collection as reported by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Vector size fixed at creation time
    pub dimensions: usize,
    pub points_count: u64,
    pub distance: String,
}

/// A vector to upsert, keyed by a stable record id.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// One search hit, highest similarity first in any returned sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: u64,
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

/// Produces embeddings for text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text for the given purpose.
    async fn embed_text(&self, text: &str, purpose: DocumentType)
        -> Result<Vec<f32>, ProviderError>;

    /// Output vector size. Known before any call is made.
    fn embedding_size(&self) -> usize;

    fn model_name(&self) -> &str;

    /// Backend name, e.g. "openai"
    fn name(&self) -> &str;
}

/// Generates text from a prompt and a running conversation.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Build a message in this backend's conventions (truncation applied).
    fn construct_message(&self, text: &str, role: MessageRole) -> Message;

    /// Generate a reply to `prompt`, sent as a user turn after `history`.
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, ProviderError>;

    fn model_name(&self) -> &str;

    fn name(&self) -> &str;
}

/// Stores vectors in named collections and searches them.
///
/// `connect` and `disconnect` are explicit lifecycle calls owned by the
/// process; every other operation fails with [`ProviderError::NotConnected`]
/// outside that window.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    async fn connect(&self) -> Result<(), ProviderError>;

    async fn disconnect(&self) -> Result<(), ProviderError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, ProviderError>;

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError>;

    /// Create `name` with `dimensions` if absent; drop it first when `reset`.
    ///
    /// Returns `true` when a collection was created, `false` when an existing
    /// one of the same size was kept. An existing collection of a different
    /// size is a [`ProviderError::DimensionMismatch`].
    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        reset: bool,
    ) -> Result<bool, ProviderError>;

    /// Returns `false` if the collection did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool, ProviderError>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, ProviderError>;

    /// Insert or overwrite records by id. Returns `true` once acknowledged.
    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> Result<bool, ProviderError>;

    /// Nearest neighbours of `vector`, ordered by non-increasing score.
    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, ProviderError>;

    fn name(&self) -> &str;
}

/// Truncate `text` to at most `max_chars` characters, trimming whitespace.
pub fn process_text(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_text_truncates_on_char_boundary() {
        assert_eq!(process_text("  héllo world  ", 5), "héllo");
        assert_eq!(process_text("short", 100), "short");
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let msg = Message::new(MessageRole::Assistant, "hi".to_string());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
