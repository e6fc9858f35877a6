//! Document store for projects, assets and chunks.
//!
//! [`DocumentStore`] is the seam to whatever database holds the records.
//! Two local implementations share one table layout: [`MemoryDocumentStore`]
//! keeps everything in memory, [`JsonDocumentStore`] also writes the tables
//! to a JSON file after every change.

pub mod tables;

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::{Asset, AssetType, ChunkRecord, NewAsset, NewChunk, Project};
pub use tables::Tables;

/// Database file name under the database directory.
pub const DATABASE_FILE: &str = "ragline.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Asset '{name}' already exists in project {project}")]
    DuplicateAsset { project: u64, name: String },

    #[error("Unknown project record {0}")]
    UnknownProject(u64),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt database file: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence for project, asset and chunk records.
///
/// Chunk ids are assigned here and are used as vector store keys.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;

    async fn insert_project(&self, project_id: &str) -> Result<Project, StoreError>;

    /// Look up a project, inserting it when absent.
    ///
    /// Two steps, not atomic: concurrent callers may both miss the lookup and
    /// insert duplicates unless the implementation serializes them.
    async fn get_or_create_project(&self, project_id: &str) -> Result<Project, StoreError> {
        if let Some(project) = self.find_project(project_id).await? {
            return Ok(project);
        }
        self.insert_project(project_id).await
    }

    /// Projects ordered by creation, with the total number of pages.
    async fn list_projects(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Project>, usize), StoreError>;

    async fn insert_asset(&self, asset: NewAsset) -> Result<Asset, StoreError>;

    async fn find_asset(&self, project: u64, name: &str) -> Result<Option<Asset>, StoreError>;

    async fn list_assets(&self, project: u64, asset_type: AssetType) -> Result<Vec<Asset>, StoreError>;

    /// Insert chunks in batches of `batch_size`, returning ids in input order.
    async fn insert_chunks(
        &self,
        chunks: Vec<NewChunk>,
        batch_size: usize,
    ) -> Result<Vec<u64>, StoreError>;

    /// Chunks of a project ordered by id; `page` starts at 1.
    async fn list_chunks(
        &self,
        project: u64,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Returns the number of deleted chunks.
    async fn delete_chunks_by_project(&self, project: u64) -> Result<usize, StoreError>;
}

/// Where a table store keeps its data between runs.
pub trait Persistence: Send + Sync {
    fn save(&self, tables: &Tables) -> Result<(), StoreError>;
}

/// No persistence: data lives as long as the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct Volatile;

impl Persistence for Volatile {
    fn save(&self, _tables: &Tables) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Persist tables as pretty JSON, replacing the file atomically.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl Persistence for JsonFile {
    fn save(&self, tables: &Tables) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(tables)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Saved database to {:?}", self.path);
        Ok(())
    }
}

/// Table-backed store. Writers are serialized within one process.
pub struct TableStore<P: Persistence> {
    tables: Mutex<Tables>,
    persistence: P,
}

pub type MemoryDocumentStore = TableStore<Volatile>;
pub type JsonDocumentStore = TableStore<JsonFile>;

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            persistence: Volatile,
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonDocumentStore {
    /// Open (or initialize) the database under `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(DATABASE_FILE);

        let tables = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let tables: Tables = serde_json::from_str(&content)?;
            info!("Loaded database from {:?}", path);
            tables
        } else {
            info!("Initializing new database at {:?}", path);
            Tables::default()
        };

        Ok(Self {
            tables: Mutex::new(tables),
            persistence: JsonFile { path },
        })
    }
}

#[async_trait]
impl<P: Persistence> DocumentStore for TableStore<P> {
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.tables.lock().await.find_project(project_id).cloned())
    }

    async fn insert_project(&self, project_id: &str) -> Result<Project, StoreError> {
        let mut tables = self.tables.lock().await;
        let project = tables.insert_project(project_id);
        self.persistence.save(&tables)?;
        Ok(project)
    }

    /// Serialized under the table lock, so it is atomic within this process.
    async fn get_or_create_project(&self, project_id: &str) -> Result<Project, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(project) = tables.find_project(project_id) {
            return Ok(project.clone());
        }
        let project = tables.insert_project(project_id);
        self.persistence.save(&tables)?;
        info!("Created project {}", project_id);
        Ok(project)
    }

    async fn list_projects(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Project>, usize), StoreError> {
        Ok(self.tables.lock().await.list_projects(page, page_size))
    }

    async fn insert_asset(&self, asset: NewAsset) -> Result<Asset, StoreError> {
        let mut tables = self.tables.lock().await;
        let asset = tables.insert_asset(asset)?;
        self.persistence.save(&tables)?;
        Ok(asset)
    }

    async fn find_asset(&self, project: u64, name: &str) -> Result<Option<Asset>, StoreError> {
        Ok(self.tables.lock().await.find_asset(project, name).cloned())
    }

    async fn list_assets(&self, project: u64, asset_type: AssetType) -> Result<Vec<Asset>, StoreError> {
        Ok(self.tables.lock().await.list_assets(project, asset_type))
    }

    async fn insert_chunks(
        &self,
        chunks: Vec<NewChunk>,
        batch_size: usize,
    ) -> Result<Vec<u64>, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut ids = Vec::with_capacity(chunks.len());
        let mut remaining = chunks.into_iter();

        loop {
            let batch: Vec<NewChunk> = remaining.by_ref().take(batch_size.max(1)).collect();
            if batch.is_empty() {
                break;
            }
            ids.extend(tables.insert_chunks(batch)?);
            self.persistence.save(&tables)?;
        }

        debug!("Inserted {} chunk records", ids.len());
        Ok(ids)
    }

    async fn list_chunks(
        &self,
        project: u64,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        Ok(self.tables.lock().await.list_chunks(project, page, page_size))
    }

    async fn delete_chunks_by_project(&self, project: u64) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock().await;
        let deleted = tables.delete_chunks_by_project(project);
        if deleted > 0 {
            self.persistence.save(&tables)?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_providers::Metadata;
    use tempfile::tempdir;

    fn chunk(project: u64, order: usize) -> NewChunk {
        NewChunk {
            text: format!("chunk {}", order),
            metadata: Metadata::new(),
            order,
            project,
            asset: None,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_project_is_stable() {
        let store = MemoryDocumentStore::new();
        let first = store.get_or_create_project("alpha").await.unwrap();
        let again = store.get_or_create_project("alpha").await.unwrap();
        let other = store.get_or_create_project("beta").await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn test_assets_unique_per_project() {
        let store = MemoryDocumentStore::new();
        let project = store.get_or_create_project("alpha").await.unwrap();
        let new_asset = NewAsset {
            project: project.id,
            asset_type: AssetType::File,
            name: "abc_notes.txt".to_string(),
            size: 12,
        };

        store.insert_asset(new_asset.clone()).await.unwrap();
        assert!(matches!(
            store.insert_asset(new_asset).await,
            Err(StoreError::DuplicateAsset { .. })
        ));

        let found = store.find_asset(project.id, "abc_notes.txt").await.unwrap();
        assert_eq!(found.map(|a| a.size), Some(12));
        assert_eq!(store.list_assets(project.id, AssetType::File).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_paging_and_delete_by_project() {
        let store = MemoryDocumentStore::new();
        let a = store.get_or_create_project("alpha").await.unwrap();
        let b = store.get_or_create_project("beta").await.unwrap();

        let ids = store
            .insert_chunks((1..=120).map(|i| chunk(a.id, i)).collect(), 100)
            .await
            .unwrap();
        store.insert_chunks(vec![chunk(b.id, 1)], 100).await.unwrap();

        assert_eq!(ids.len(), 120);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let page1 = store.list_chunks(a.id, 1, 50).await.unwrap();
        let page3 = store.list_chunks(a.id, 3, 50).await.unwrap();
        let page4 = store.list_chunks(a.id, 4, 50).await.unwrap();
        assert_eq!(page1.len(), 50);
        assert_eq!(page1[0].id, ids[0]);
        assert_eq!(page3.len(), 20);
        assert!(page4.is_empty());

        assert_eq!(store.delete_chunks_by_project(a.id).await.unwrap(), 120);
        assert!(store.list_chunks(a.id, 1, 50).await.unwrap().is_empty());
        assert_eq!(store.list_chunks(b.id, 1, 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chunks_require_known_project() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            store.insert_chunks(vec![chunk(42, 1)], 10).await,
            Err(StoreError::UnknownProject(42))
        ));
    }

    #[tokio::test]
    async fn test_list_projects_pages() {
        let store = MemoryDocumentStore::new();
        for name in ["a1", "b2", "c3", "d4", "e5"] {
            store.get_or_create_project(name).await.unwrap();
        }

        let (page, total) = store.list_projects(2, 2).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<&str> = page.iter().map(|p| p.project_id.as_str()).collect();
        assert_eq!(names, vec!["c3", "d4"]);
    }

    #[tokio::test]
    async fn test_huge_page_numbers_are_empty() {
        let store = MemoryDocumentStore::new();
        let project = store.get_or_create_project("a1").await.unwrap();
        store
            .insert_chunks(vec![chunk(project.id, 1)], 10)
            .await
            .unwrap();

        let (page, total) = store.list_projects(usize::MAX, 2).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 1);
        assert!(store
            .list_chunks(project.id, usize::MAX, 50)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_json_store_persists_between_opens() {
        let dir = tempdir().unwrap();

        let project_id = {
            let store = JsonDocumentStore::open(dir.path()).unwrap();
            let project = store.get_or_create_project("alpha").await.unwrap();
            store
                .insert_chunks(vec![chunk(project.id, 1), chunk(project.id, 2)], 100)
                .await
                .unwrap();
            project.id
        };

        let reopened = JsonDocumentStore::open(dir.path()).unwrap();
        let project = reopened.find_project("alpha").await.unwrap().unwrap();
        assert_eq!(project.id, project_id);
        assert_eq!(reopened.list_chunks(project.id, 1, 10).await.unwrap().len(), 2);

        // Ids keep increasing after reopen.
        let ids = reopened.insert_chunks(vec![chunk(project.id, 3)], 100).await.unwrap();
        assert!(ids[0] > 2);
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DATABASE_FILE), "not json").unwrap();
        assert!(matches!(
            JsonDocumentStore::open(dir.path()),
            Err(StoreError::Serialization(_))
        ));
    }
}
