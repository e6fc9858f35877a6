//! In-memory table layout shared by the local document stores.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::models::{Asset, AssetType, ChunkRecord, NewAsset, NewChunk, Project};

/// All records, keyed by store-assigned id. Serializes to the database file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Tables {
    next_id: u64,
    projects: BTreeMap<u64, Project>,
    assets: BTreeMap<u64, Asset>,
    chunks: BTreeMap<u64, ChunkRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn find_project(&self, project_id: &str) -> Option<&Project> {
        self.projects.values().find(|p| p.project_id == project_id)
    }

    pub(crate) fn insert_project(&mut self, project_id: &str) -> Project {
        let project = Project {
            id: self.allocate_id(),
            project_id: project_id.to_string(),
            created_at: Utc::now(),
        };
        self.projects.insert(project.id, project.clone());
        project
    }

    pub(crate) fn list_projects(&self, page: usize, page_size: usize) -> (Vec<Project>, usize) {
        let page_size = page_size.max(1);
        let total_pages = self.projects.len().div_ceil(page_size);
        let projects = self
            .projects
            .values()
            .skip(page.saturating_sub(1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();
        (projects, total_pages)
    }

    pub(crate) fn insert_asset(&mut self, asset: NewAsset) -> Result<Asset, StoreError> {
        if !self.projects.contains_key(&asset.project) {
            return Err(StoreError::UnknownProject(asset.project));
        }
        if self.find_asset(asset.project, &asset.name).is_some() {
            return Err(StoreError::DuplicateAsset {
                project: asset.project,
                name: asset.name,
            });
        }

        let record = Asset {
            id: self.allocate_id(),
            project: asset.project,
            asset_type: asset.asset_type,
            name: asset.name,
            size: asset.size,
            created_at: Utc::now(),
        };
        self.assets.insert(record.id, record.clone());
        Ok(record)
    }

    pub(crate) fn find_asset(&self, project: u64, name: &str) -> Option<&Asset> {
        self.assets
            .values()
            .find(|a| a.project == project && a.name == name)
    }

    pub(crate) fn list_assets(&self, project: u64, asset_type: AssetType) -> Vec<Asset> {
        self.assets
            .values()
            .filter(|a| a.project == project && a.asset_type == asset_type)
            .cloned()
            .collect()
    }

    /// All-or-nothing per batch: owners are checked before any insert.
    pub(crate) fn insert_chunks(&mut self, batch: Vec<NewChunk>) -> Result<Vec<u64>, StoreError> {
        if let Some(bad) = batch.iter().find(|c| !self.projects.contains_key(&c.project)) {
            return Err(StoreError::UnknownProject(bad.project));
        }

        let mut ids = Vec::with_capacity(batch.len());
        for chunk in batch {
            let id = self.allocate_id();
            self.chunks.insert(
                id,
                ChunkRecord {
                    id,
                    text: chunk.text,
                    metadata: chunk.metadata,
                    order: chunk.order,
                    project: chunk.project,
                    asset: chunk.asset,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    pub(crate) fn list_chunks(&self, project: u64, page: usize, page_size: usize) -> Vec<ChunkRecord> {
        let page_size = page_size.max(1);
        self.chunks
            .values()
            .filter(|c| c.project == project)
            .skip(page.saturating_sub(1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect()
    }

    pub(crate) fn delete_chunks_by_project(&mut self, project: u64) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|_, c| c.project != project);
        before - self.chunks.len()
    }
}
