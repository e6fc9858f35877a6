//! Component wiring for one CLI invocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use ragline_config::Settings;
use ragline_core::{IngestService, JsonDocumentStore, LocalFileStore, RetrievalOrchestrator};
use ragline_index::{IndexerConfig, IndexingPipeline};
use ragline_prompts::TemplateCatalog;
use ragline_providers::{ProviderRegistry, VectorStoreProvider};
use tracing::{debug, warn};

/// Services built from settings, sharing one vector store handle.
pub struct App {
    pub settings: Settings,
    pub store: Arc<dyn VectorStoreProvider>,
    pub ingest: IngestService,
    pub retrieval: RetrievalOrchestrator,
}

impl App {
    /// Build every component. The vector store is not connected yet.
    pub fn build(settings: Settings) -> Result<Self> {
        let registry =
            ProviderRegistry::from_settings(&settings).context("Invalid provider settings")?;
        let embeddings = registry
            .embedding_provider()
            .context("Failed to create embedding provider")?;
        let generation = registry
            .generation_provider()
            .context("Failed to create generation provider")?;
        let store = registry.vector_store();

        let templates = Arc::new(
            TemplateCatalog::from_config(&settings.templates)
                .context("Failed to load prompt templates")?,
        );
        let documents = Arc::new(
            JsonDocumentStore::open(settings.files.database_dir())
                .context("Failed to open document store")?,
        );
        let files = Arc::new(LocalFileStore::new(&settings.files));

        let pipeline = IndexingPipeline::new(
            IndexerConfig::from_limits(&settings.limits),
            embeddings.clone(),
            store.clone(),
        );
        let ingest = IngestService::new(documents, files, store.clone(), pipeline);
        let retrieval = RetrievalOrchestrator::new(embeddings, generation, store.clone(), templates);

        debug!(
            "Built services: embedding={}, generation={}, vectordb={}",
            registry.embedding_backend(),
            registry.generation_backend(),
            registry.vectordb_backend()
        );

        Ok(Self {
            settings,
            store,
            ingest,
            retrieval,
        })
    }

    pub async fn connect(&self) -> Result<()> {
        self.store
            .connect()
            .await
            .context("Failed to connect to the vector store")
    }

    /// Release the vector store connection. Failures are logged only.
    pub async fn disconnect(&self) {
        if let Err(e) = self.store.disconnect().await {
            warn!("Failed to disconnect from the vector store: {}", e);
        }
    }
}
