//! Error taxonomy for ingestion and retrieval.
//!
//! Absent data (no files, no chunks, no search hits) is not an error; those
//! cases are reported through the outcome types in [`crate::ingest`] and
//! [`crate::retrieval`].

use ragline_index::{ChunkerError, IndexError};
use ragline_prompts::TemplateError;
use ragline_providers::ProviderError;
use thiserror::Error;

use crate::files::FileError;
use crate::signal::ResponseSignal;
use crate::store::StoreError;

/// Broad class of a [`RagError`], used to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings or request parameters. Never retried.
    Configuration,
    /// An external call failed or timed out.
    ProviderCall,
    /// Embedding size differs from the collection's. Needs a reset.
    DimensionMismatch,
    /// Document or file storage failed.
    Storage,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid project id '{0}': must be non-empty and alphanumeric")]
    InvalidProjectId(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid chunking parameters: {0}")]
    Chunking(#[from] ChunkerError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Project {project}: {stage} failed for {collection}: {source}")]
    ProviderCall {
        project: String,
        collection: String,
        stage: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Project {project}: collection {collection} expects {expected} dimensions, got {actual}")]
    DimensionMismatch {
        project: String,
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Records up to `inserted` were indexed; re-running without reset
    /// completes the job.
    #[error("Indexing incomplete for project {project} after {inserted} records: {source}")]
    IndexingIncomplete {
        project: String,
        inserted: usize,
        #[source]
        source: IndexError,
    },

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("File storage error: {0}")]
    File(#[from] FileError),
}

impl RagError {
    pub(crate) fn provider_call(
        project: &str,
        collection: &str,
        stage: &'static str,
        source: ProviderError,
    ) -> Self {
        if let ProviderError::DimensionMismatch {
            expected, actual, ..
        } = source
        {
            return Self::DimensionMismatch {
                project: project.to_string(),
                collection: collection.to_string(),
                expected,
                actual,
            };
        }
        Self::ProviderCall {
            project: project.to_string(),
            collection: collection.to_string(),
            stage,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidProjectId(_)
            | Self::InvalidRequest(_)
            | Self::Chunking(_)
            | Self::Template(_) => ErrorKind::Configuration,
            Self::ProviderCall { source, .. } => match source {
                ProviderError::Configuration(_) => ErrorKind::Configuration,
                _ => ErrorKind::ProviderCall,
            },
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::IndexingIncomplete { source, .. } => match source {
                IndexError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
                IndexError::Cancelled { .. } => ErrorKind::Cancelled,
                IndexError::MismatchedIds { .. } => ErrorKind::Configuration,
                _ => ErrorKind::ProviderCall,
            },
            Self::Store(_) | Self::File(_) => ErrorKind::Storage,
        }
    }

    /// Whether retrying the same stage may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderCall { source, .. } => source.is_retryable(),
            Self::IndexingIncomplete { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Signal to report for this error; `failed` is the operation's own
    /// failure signal.
    pub fn signal(&self, failed: ResponseSignal) -> ResponseSignal {
        match self {
            Self::InvalidProjectId(_) => ResponseSignal::ProjectIdInvalid,
            Self::Template(_) => ResponseSignal::TemplateParsingError,
            Self::DimensionMismatch { .. } => ResponseSignal::DimensionMismatch,
            _ => match self.kind() {
                ErrorKind::DimensionMismatch => ResponseSignal::DimensionMismatch,
                ErrorKind::Cancelled => ResponseSignal::OperationCancelled,
                _ => failed,
            },
        }
    }
}
