//! Indexing pipeline.
//!
//! Embeds a project's chunks and upserts them into the project's collection.
//! Embedding runs with bounded concurrency but results keep input order, so
//! every vector lands under the id supplied at the same position.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use ragline_config::LimitsConfig;
use ragline_providers::{
    DocumentType, EmbeddingProvider, ProviderError, VectorRecord, VectorStoreProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chunker::TextChunk;
use crate::error::{IndexError, IndexStage};

/// Deterministic collection name for a project.
pub fn collection_name(project_id: &str) -> String {
    format!("collection_{}", project_id.trim())
}

/// Bounds for an indexing run.
#[derive(Debug, Clone, Copy)]
pub struct IndexerConfig {
    /// Embedding requests in flight at once
    pub embedding_concurrency: usize,
    /// Records per vector store upsert
    pub upsert_batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            embedding_concurrency: 8,
            upsert_batch_size: 100,
        }
    }
}

impl IndexerConfig {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            embedding_concurrency: limits.embedding_concurrency.max(1),
            upsert_batch_size: limits.upsert_batch_size.max(1),
        }
    }
}

/// Statistics about an indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub collection: String,
    /// Whether the collection was created (or recreated) by this run
    pub collection_created: bool,
    pub chunks_embedded: usize,
    pub records_upserted: usize,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Embeds chunks and writes them to the vector store.
pub struct IndexingPipeline {
    config: IndexerConfig,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
}

impl IndexingPipeline {
    pub fn new(
        config: IndexerConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        Self {
            config,
            embeddings,
            store,
        }
    }

    /// Index `chunks` for `project_id`, keyed by `chunk_ids`.
    ///
    /// With `reset`, the collection is dropped and recreated before writing.
    /// Re-indexing an id that already exists overwrites it. Every embedding
    /// is computed before the collection is touched, so an embedding failure
    /// leaves the store unchanged.
    pub async fn index(
        &self,
        project_id: &str,
        chunks: &[TextChunk],
        chunk_ids: &[u64],
        reset: bool,
        cancel: &CancellationToken,
    ) -> Result<IndexStats, IndexError> {
        let start = Instant::now();
        let collection = collection_name(project_id);

        if chunks.len() != chunk_ids.len() {
            return Err(IndexError::MismatchedIds {
                project: project_id.to_string(),
                chunks: chunks.len(),
                ids: chunk_ids.len(),
            });
        }

        let mut stats = IndexStats {
            collection: collection.clone(),
            ..Default::default()
        };

        if chunks.is_empty() {
            debug!(project = project_id, "No chunks to index");
            return Ok(stats);
        }

        info!(
            project = project_id,
            collection = %collection,
            chunks = chunks.len(),
            reset,
            "Starting indexing"
        );

        let vectors = self.embed_all(project_id, &collection, chunks, chunk_ids, cancel).await?;
        stats.chunks_embedded = vectors.len();

        self.check_cancelled(project_id, &collection, cancel, 0)?;
        stats.collection_created = self
            .store
            .create_collection(&collection, self.embeddings.embedding_size(), reset)
            .await
            .map_err(|e| store_error(project_id, &collection, IndexStage::CreateCollection, e))?;

        let mut records = chunks
            .iter()
            .zip(chunk_ids)
            .zip(vectors)
            .map(|((chunk, id), vector)| VectorRecord {
                id: *id,
                vector,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            });

        loop {
            let batch: Vec<VectorRecord> = records.by_ref().take(self.config.upsert_batch_size).collect();
            if batch.is_empty() {
                break;
            }
            self.check_cancelled(project_id, &collection, cancel, stats.records_upserted)?;

            let size = batch.len();
            let acknowledged = self
                .store
                .upsert(&collection, batch)
                .await
                .map_err(|e| store_error(project_id, &collection, IndexStage::Upsert, e))?;
            if !acknowledged {
                error!(project = project_id, collection = %collection, "Upsert not acknowledged");
                return Err(IndexError::Unacknowledged {
                    project: project_id.to_string(),
                    collection,
                    upserted: stats.records_upserted,
                });
            }

            stats.records_upserted += size;
            stats.batches += 1;
            debug!(
                collection = %collection,
                "Upserted batch {} ({} records)", stats.batches, size
            );
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(project = project_id, "Indexing complete: {:?}", stats);
        Ok(stats)
    }

    /// Embed every chunk, preserving order. The first failure aborts the run.
    async fn embed_all(
        &self,
        project_id: &str,
        collection: &str,
        chunks: &[TextChunk],
        chunk_ids: &[u64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let provider = &self.embeddings;
        let expected = provider.embedding_size();

        let embed = stream::iter(chunks.iter().enumerate())
            .map(move |(position, chunk)| async move {
                provider
                    .embed_text(&chunk.text, DocumentType::Document)
                    .await
                    .map_err(|e| (position, e))
            })
            .buffered(self.config.embedding_concurrency)
            .try_collect::<Vec<Vec<f32>>>();

        let vectors = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(IndexError::Cancelled {
                    project: project_id.to_string(),
                    collection: collection.to_string(),
                    upserted: 0,
                });
            }
            result = embed => result.map_err(|(position, source)| {
                error!(
                    project = project_id,
                    chunk_id = chunk_ids[position],
                    "Embedding failed: {}", source
                );
                IndexError::Embedding {
                    project: project_id.to_string(),
                    collection: collection.to_string(),
                    chunk_id: chunk_ids[position],
                    ordinal: chunks[position].ordinal,
                    source,
                }
            })?,
        };

        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                project: project_id.to_string(),
                collection: collection.to_string(),
                expected,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }

    fn check_cancelled(
        &self,
        project_id: &str,
        collection: &str,
        cancel: &CancellationToken,
        upserted: usize,
    ) -> Result<(), IndexError> {
        if cancel.is_cancelled() {
            info!(project = project_id, upserted, "Indexing cancelled");
            return Err(IndexError::Cancelled {
                project: project_id.to_string(),
                collection: collection.to_string(),
                upserted,
            });
        }
        Ok(())
    }
}

fn store_error(project: &str, collection: &str, stage: IndexStage, source: ProviderError) -> IndexError {
    if let ProviderError::DimensionMismatch {
        expected, actual, ..
    } = source
    {
        return IndexError::DimensionMismatch {
            project: project.to_string(),
            collection: collection.to_string(),
            expected,
            actual,
        };
    }
    error!(project, collection, %stage, "Vector store call failed: {}", source);
    IndexError::Store {
        project: project.to_string(),
        collection: collection.to_string(),
        stage,
        source,
    }
}
