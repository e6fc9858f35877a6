//! Upload, process and push flows.
//!
//! `upload` stores a file and records it as an asset. `process` splits a
//! project's files into chunk records. `push` indexes those records into the
//! project's vector collection. Each step can be re-run: `process` with
//! `reset` replaces the chunk records, and `push` without `reset`
//! overwrites vectors by chunk id.

use std::sync::Arc;

use ragline_config::RequestDefaults;
use ragline_index::{collection_name, ChunkSplitter, IndexingPipeline, TextChunk};
use ragline_providers::{CollectionInfo, VectorStoreProvider};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RagError;
use crate::files::{FileError, FileStore};
use crate::models::{Asset, AssetType, NewAsset, NewChunk, Project, ProjectPage};
use crate::signal::ResponseSignal;
use crate::store::DocumentStore;
use crate::validate_project_id;

/// Chunk records are written to the document store in batches of this size.
pub const CHUNK_INSERT_BATCH_SIZE: usize = 100;

/// Chunk records are read back for indexing in pages of this size.
pub const PUSH_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Stored { file_id: String, asset_id: u64, size: u64 },
    Rejected { signal: ResponseSignal },
}

impl UploadOutcome {
    pub fn signal(&self) -> ResponseSignal {
        match self {
            Self::Stored { .. } => ResponseSignal::FileUploadSuccess,
            Self::Rejected { signal } => *signal,
        }
    }
}

/// Parameters of a `process` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    /// Process one file; all file assets of the project when `None`
    pub file_id: Option<String>,
    pub chunk_size: usize,
    pub overlap_size: usize,
    /// Delete the project's existing chunk records first
    pub reset: bool,
}

impl ProcessRequest {
    pub fn from_defaults(defaults: &RequestDefaults) -> Self {
        Self {
            file_id: None,
            chunk_size: defaults.chunk_size,
            overlap_size: defaults.overlap_size,
            reset: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Completed {
        inserted_chunks: usize,
        processed_files: usize,
    },
    /// The project has no file assets.
    NoFiles,
    /// The requested file id is unknown or cannot be loaded.
    FileNotFound { file_id: String },
}

impl ProcessOutcome {
    pub fn signal(&self) -> ResponseSignal {
        match self {
            Self::Completed {
                inserted_chunks: 0, ..
            } => ResponseSignal::ProcessingFailed,
            Self::Completed { .. } => ResponseSignal::ProcessingCompleted,
            Self::NoFiles => ResponseSignal::NoFilesError,
            Self::FileNotFound { .. } => ResponseSignal::FileIdError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    Inserted { inserted_items_count: usize },
    /// The project has no chunk records to index.
    NoChunks,
}

impl PushOutcome {
    pub fn signal(&self) -> ResponseSignal {
        match self {
            Self::Inserted { .. } => ResponseSignal::InsertIntoVectordbSuccess,
            Self::NoChunks => ResponseSignal::InsertIntoVectordbError,
        }
    }
}

/// Ingestion entry points over the document store, file store and index.
pub struct IngestService {
    documents: Arc<dyn DocumentStore>,
    files: Arc<dyn FileStore>,
    store: Arc<dyn VectorStoreProvider>,
    pipeline: IndexingPipeline,
}

impl IngestService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        files: Arc<dyn FileStore>,
        store: Arc<dyn VectorStoreProvider>,
        pipeline: IndexingPipeline,
    ) -> Self {
        Self {
            documents,
            files,
            store,
            pipeline,
        }
    }

    async fn project(&self, project_id: &str) -> Result<Project, RagError> {
        let project_id = validate_project_id(project_id)?;
        Ok(self.documents.get_or_create_project(project_id).await?)
    }

    /// Validate and store an uploaded file, recording it as an asset.
    pub async fn upload(
        &self,
        project_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<UploadOutcome, RagError> {
        let project = self.project(project_id).await?;

        if let Err(signal) = self.files.validate(file_name, content.len() as u64) {
            info!(project = project_id, file = file_name, %signal, "Upload rejected");
            return Ok(UploadOutcome::Rejected { signal });
        }

        let stored = self.files.save(&project.project_id, file_name, content).await?;
        let asset = self
            .documents
            .insert_asset(NewAsset {
                project: project.id,
                asset_type: AssetType::File,
                name: stored.file_id.clone(),
                size: stored.size,
            })
            .await?;

        Ok(UploadOutcome::Stored {
            file_id: stored.file_id,
            asset_id: asset.id,
            size: asset.size,
        })
    }

    /// Split one file, or every file of the project, into chunk records.
    pub async fn process(
        &self,
        project_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProcessOutcome, RagError> {
        let splitter = ChunkSplitter::new(request.chunk_size, request.overlap_size)?;
        let project = self.project(project_id).await?;

        let targets: Vec<(String, Option<u64>)> = match &request.file_id {
            Some(file_id) => {
                let asset = self.documents.find_asset(project.id, file_id).await?;
                vec![(file_id.clone(), asset.map(|a| a.id))]
            }
            None => {
                let assets = self.documents.list_assets(project.id, AssetType::File).await?;
                if assets.is_empty() {
                    info!(project = project_id, "No files to process");
                    return Ok(ProcessOutcome::NoFiles);
                }
                assets.into_iter().map(|a: Asset| (a.name, Some(a.id))).collect()
            }
        };

        let mut pending: Vec<NewChunk> = Vec::new();
        let mut processed_files = 0;

        for (file_id, asset_id) in targets {
            let sections = match self.files.load(&project.project_id, &file_id).await {
                Ok(sections) => sections,
                Err(err @ (FileError::NotFound { .. } | FileError::Unsupported { .. })) => {
                    if request.file_id.is_some() {
                        info!(project = project_id, "Cannot process {}: {}", file_id, err);
                        return Ok(ProcessOutcome::FileNotFound { file_id });
                    }
                    warn!(project = project_id, "Skipping {}: {}", file_id, err);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let chunks = splitter.split_document(
                sections.iter().map(|s| (s.text.as_str(), &s.metadata)),
            );
            info!(project = project_id, file = %file_id, chunks = chunks.len(), "Split file");

            pending.extend(
                chunks
                    .into_iter()
                    .map(|c| NewChunk::from_text_chunk(c, project.id, asset_id)),
            );
            processed_files += 1;
        }

        if request.reset {
            let deleted = self.documents.delete_chunks_by_project(project.id).await?;
            info!(project = project_id, deleted, "Reset chunk records");
        }

        let inserted_chunks = self
            .documents
            .insert_chunks(pending, CHUNK_INSERT_BATCH_SIZE)
            .await?
            .len();

        Ok(ProcessOutcome::Completed {
            inserted_chunks,
            processed_files,
        })
    }

    /// Index every chunk record of the project, one page at a time.
    ///
    /// `reset` recreates the collection before the first page only.
    pub async fn push(
        &self,
        project_id: &str,
        reset: bool,
        cancel: &CancellationToken,
    ) -> Result<PushOutcome, RagError> {
        let project = self.project(project_id).await?;
        let mut inserted = 0;
        let mut page = 1;

        loop {
            let records = self
                .documents
                .list_chunks(project.id, page, PUSH_PAGE_SIZE)
                .await?;
            if records.is_empty() {
                break;
            }

            let chunks: Vec<TextChunk> = records.iter().map(|r| r.to_text_chunk()).collect();
            let ids: Vec<u64> = records.iter().map(|r| r.id).collect();

            let stats = self
                .pipeline
                .index(&project.project_id, &chunks, &ids, reset && page == 1, cancel)
                .await
                .map_err(|source| RagError::IndexingIncomplete {
                    project: project.project_id.clone(),
                    inserted,
                    source,
                })?;

            inserted += stats.records_upserted;
            page += 1;
        }

        if page == 1 {
            info!(project = project_id, "No chunks to push");
            return Ok(PushOutcome::NoChunks);
        }

        info!(project = project_id, inserted, "Pushed chunks to vector store");
        Ok(PushOutcome::Inserted {
            inserted_items_count: inserted,
        })
    }

    /// Collection details, or `None` when the project has no collection.
    pub async fn collection_info(&self, project_id: &str) -> Result<Option<CollectionInfo>, RagError> {
        let project = self.project(project_id).await?;
        let collection = collection_name(&project.project_id);

        let exists = self
            .store
            .collection_exists(&collection)
            .await
            .map_err(|e| RagError::provider_call(project_id, &collection, "collection_exists", e))?;
        if !exists {
            return Ok(None);
        }

        self.store
            .collection_info(&collection)
            .await
            .map(Some)
            .map_err(|e| RagError::provider_call(project_id, &collection, "collection_info", e))
    }

    /// Drop the project's collection. Returns `false` if it did not exist.
    pub async fn reset_collection(&self, project_id: &str) -> Result<bool, RagError> {
        let project = self.project(project_id).await?;
        let collection = collection_name(&project.project_id);

        let deleted = self
            .store
            .delete_collection(&collection)
            .await
            .map_err(|e| RagError::provider_call(project_id, &collection, "delete_collection", e))?;
        info!(project = project_id, deleted, "Reset collection {}", collection);
        Ok(deleted)
    }

    /// List projects; `page` starts at 1.
    pub async fn list_projects(&self, page: usize, page_size: usize) -> Result<ProjectPage, RagError> {
        if page == 0 || page_size == 0 {
            return Err(RagError::InvalidRequest(
                "page and page_size must be at least 1".to_string(),
            ));
        }
        let (projects, total_pages) = self.documents.list_projects(page, page_size).await?;
        Ok(ProjectPage {
            projects,
            page,
            total_pages,
        })
    }
}
