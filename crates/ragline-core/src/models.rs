//! Records kept by the document store.

use chrono::{DateTime, Utc};
use ragline_index::TextChunk;
use ragline_providers::Metadata;
use serde::{Deserialize, Serialize};

/// A project, created on first reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Store-assigned record id
    pub id: u64,
    /// User-supplied alphanumeric identity
    pub project_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    File,
}

/// A named resource owned by one project. Unique per (project, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,
    /// Record id of the owning project
    pub project: u64,
    pub asset_type: AssetType,
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub project: u64,
    pub asset_type: AssetType,
    pub name: String,
    pub size: u64,
}

/// A chunk waiting for a store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub text: String,
    pub metadata: Metadata,
    pub order: usize,
    pub project: u64,
    pub asset: Option<u64>,
}

impl NewChunk {
    pub fn from_text_chunk(chunk: TextChunk, project: u64, asset: Option<u64>) -> Self {
        Self {
            text: chunk.text,
            metadata: chunk.metadata,
            order: chunk.ordinal,
            project,
            asset,
        }
    }
}

/// A persisted chunk. Write-once; the id is the vector store key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: u64,
    pub text: String,
    pub metadata: Metadata,
    pub order: usize,
    pub project: u64,
    pub asset: Option<u64>,
}

impl ChunkRecord {
    pub fn to_text_chunk(&self) -> TextChunk {
        TextChunk {
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            ordinal: self.order,
        }
    }
}

/// One page of projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub page: usize,
    pub total_pages: usize,
}
