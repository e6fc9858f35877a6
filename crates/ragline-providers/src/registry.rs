//! Backend selection.
//!
//! Backend names from configuration are parsed into closed enums when the
//! registry is built, so an unknown name fails at startup rather than at
//! first use. Building the registry performs no I/O.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ragline_config::{LlmConfig, Settings, VectorDbConfig};
use tracing::info;

use crate::cohere::CohereProvider;
use crate::memory::MemoryVectorStore;
use crate::openai::OpenAiProvider;
use crate::qdrant::QdrantStore;
use crate::retry::RetryPolicy;
use crate::{EmbeddingProvider, GenerationProvider, ProviderError, VectorStoreProvider};

/// Backends able to embed and generate text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Cohere,
}

impl LlmBackend {
    pub const ALL: [LlmBackend; 2] = [LlmBackend::OpenAi, LlmBackend::Cohere];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Cohere => "cohere",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| unknown_backend("LLM", s, &Self::ALL.map(|b| b.as_str())))
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backends able to store and search vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDbBackend {
    Qdrant,
    Memory,
}

impl VectorDbBackend {
    pub const ALL: [VectorDbBackend; 2] = [VectorDbBackend::Qdrant, VectorDbBackend::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qdrant => "qdrant",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for VectorDbBackend {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| unknown_backend("vector store", s, &Self::ALL.map(|b| b.as_str())))
    }
}

impl fmt::Display for VectorDbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn unknown_backend(kind: &str, name: &str, known: &[&str]) -> ProviderError {
    ProviderError::Configuration(format!(
        "Unknown {} backend '{}' (registered: {})",
        kind,
        name,
        known.join(", ")
    ))
}

/// Resolved backend choices plus the settings needed to build them.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    embedding: LlmBackend,
    generation: LlmBackend,
    vectordb: VectorDbBackend,
    llm: LlmConfig,
    vectordb_config: VectorDbConfig,
    retry: RetryPolicy,
}

impl ProviderRegistry {
    /// Validate backend names and credentials from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let embedding: LlmBackend = settings.llm.embedding_backend.parse()?;
        let generation: LlmBackend = settings.llm.generation_backend.parse()?;
        let vectordb: VectorDbBackend = settings.vectordb.backend.parse()?;

        for backend in [embedding, generation] {
            let key = match backend {
                LlmBackend::OpenAi => &settings.llm.openai.api_key,
                LlmBackend::Cohere => &settings.llm.cohere.api_key,
            };
            if key.is_none() {
                return Err(ProviderError::Configuration(format!(
                    "llm.{}.api_key is required for the {} backend",
                    backend, backend
                )));
            }
        }

        info!(
            "Provider registry: embedding={}, generation={}, vectordb={}",
            embedding, generation, vectordb
        );

        Ok(Self {
            embedding,
            generation,
            vectordb,
            llm: settings.llm.clone(),
            vectordb_config: settings.vectordb.clone(),
            retry: RetryPolicy::from_limits(&settings.limits),
        })
    }

    pub fn embedding_backend(&self) -> LlmBackend {
        self.embedding
    }

    pub fn generation_backend(&self) -> LlmBackend {
        self.generation
    }

    pub fn vectordb_backend(&self) -> VectorDbBackend {
        self.vectordb
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Construct the configured embedding provider.
    pub fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        Ok(match self.embedding {
            LlmBackend::OpenAi => Arc::new(OpenAiProvider::from_config(&self.llm, self.retry)?),
            LlmBackend::Cohere => Arc::new(CohereProvider::from_config(&self.llm, self.retry)?),
        })
    }

    /// Construct the configured generation provider.
    pub fn generation_provider(&self) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        Ok(match self.generation {
            LlmBackend::OpenAi => Arc::new(OpenAiProvider::from_config(&self.llm, self.retry)?),
            LlmBackend::Cohere => Arc::new(CohereProvider::from_config(&self.llm, self.retry)?),
        })
    }

    /// Construct the configured vector store, not yet connected.
    pub fn vector_store(&self) -> Arc<dyn VectorStoreProvider> {
        match self.vectordb {
            VectorDbBackend::Qdrant => Arc::new(QdrantStore::new(&self.vectordb_config, self.retry)),
            VectorDbBackend::Memory => Arc::new(MemoryVectorStore::new(self.vectordb_config.distance)),
        }
    }
}
