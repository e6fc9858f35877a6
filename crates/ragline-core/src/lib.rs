//! Ingestion and retrieval-augmented answering for ragline.
//!
//! This crate provides:
//! - Project, asset and chunk records behind a [`DocumentStore`]
//! - Upload storage and document loading behind a [`FileStore`]
//! - [`IngestService`]: upload, process (split into chunk records) and push
//!   (index into the vector store)
//! - [`RetrievalOrchestrator`]: semantic search and grounded answers

pub mod error;
pub mod files;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod signal;
pub mod store;

pub use error::{ErrorKind, RagError};
pub use files::{DocumentSection, FileError, FileStore, LocalFileStore, StoredFile};
pub use ingest::{IngestService, ProcessOutcome, ProcessRequest, PushOutcome, UploadOutcome};
pub use models::{Asset, AssetType, ChunkRecord, NewAsset, NewChunk, Project, ProjectPage};
pub use retrieval::{AnswerOutcome, NoResultsReason, RagAnswer, RetrievalOrchestrator, SearchOutcome};
pub use signal::ResponseSignal;
pub use store::{DocumentStore, JsonDocumentStore, MemoryDocumentStore, StoreError};

/// Check a user-supplied project id: non-empty and alphanumeric.
///
/// Returns the id with surrounding whitespace removed.
pub fn validate_project_id(project_id: &str) -> Result<&str, RagError> {
    let trimmed = project_id.trim();
    if trimmed.is_empty() || !trimmed.chars().all(char::is_alphanumeric) {
        return Err(RagError::InvalidProjectId(project_id.to_string()));
    }
    Ok(trimmed)
}
