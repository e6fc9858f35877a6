//! Indexing errors.

use std::fmt;

use ragline_providers::ProviderError;
use thiserror::Error;

/// Step of an indexing run that talks to the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStage {
    Embed,
    CreateCollection,
    Upsert,
}

impl fmt::Display for IndexStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Embed => "embed",
            Self::CreateCollection => "create_collection",
            Self::Upsert => "upsert",
        })
    }
}

/// Errors raised by [`crate::IndexingPipeline`]. Each carries the project
/// and collection it concerns.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Project {project}: {chunks} chunks but {ids} chunk ids")]
    MismatchedIds {
        project: String,
        chunks: usize,
        ids: usize,
    },

    #[error("Project {project}: failed to embed chunk {chunk_id} (ordinal {ordinal}) for {collection}: {source}")]
    Embedding {
        project: String,
        collection: String,
        chunk_id: u64,
        ordinal: usize,
        #[source]
        source: ProviderError,
    },

    /// Needs an explicit reset; never reconciled automatically.
    #[error("Project {project}: collection {collection} expects {expected} dimensions, got {actual}")]
    DimensionMismatch {
        project: String,
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Project {project}: {stage} failed for {collection}: {source}")]
    Store {
        project: String,
        collection: String,
        stage: IndexStage,
        #[source]
        source: ProviderError,
    },

    #[error("Project {project}: upsert into {collection} not acknowledged after {upserted} records")]
    Unacknowledged {
        project: String,
        collection: String,
        upserted: usize,
    },

    #[error("Project {project}: indexing into {collection} cancelled after {upserted} records")]
    Cancelled {
        project: String,
        collection: String,
        upserted: usize,
    },
}

impl IndexError {
    /// Whether re-running the same call (without reset) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Embedding { source, .. } | Self::Store { source, .. } => source.is_retryable(),
            Self::Unacknowledged { .. } => true,
            _ => false,
        }
    }

    pub fn stage(&self) -> Option<IndexStage> {
        match self {
            Self::Embedding { .. } => Some(IndexStage::Embed),
            Self::Store { stage, .. } => Some(*stage),
            Self::Unacknowledged { .. } => Some(IndexStage::Upsert),
            _ => None,
        }
    }
}
