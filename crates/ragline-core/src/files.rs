//! Raw file storage and document loading.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use ragline_config::FileConfig;
use ragline_providers::Metadata;
use serde_json::json;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::signal::ResponseSignal;

const FILE_ID_PREFIX_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("No file '{file_id}' in project {project_id}")]
    NotFound { project_id: String, file_id: String },

    #[error("Unsupported document type '{extension}' for {file_id}")]
    Unsupported { file_id: String, extension: String },

    #[error("File IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One loaded section of a document (a page, or the whole text).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSection {
    pub text: String,
    pub metadata: Metadata,
}

/// A file written to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Name under the project directory; doubles as the file id
    pub file_id: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Stores uploaded files and loads them back as text sections.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Check an upload's type and size before it is written.
    fn validate(&self, file_name: &str, size: u64) -> Result<(), ResponseSignal>;

    async fn save(
        &self,
        project_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<StoredFile, FileError>;

    /// Load a stored document as ordered sections.
    async fn load(&self, project_id: &str, file_id: &str) -> Result<Vec<DocumentSection>, FileError>;
}

/// Files on the local filesystem under `<data_dir>/files/<project_id>/`.
pub struct LocalFileStore {
    root: PathBuf,
    allowed_types: Vec<String>,
    max_size_bytes: u64,
    write_buffer: usize,
}

impl LocalFileStore {
    pub fn new(config: &FileConfig) -> Self {
        Self {
            root: config.files_dir(),
            allowed_types: config.allowed_types.clone(),
            max_size_bytes: config.max_size_bytes(),
            write_buffer: config.default_chunk_size.max(1),
        }
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }
}

/// MIME type inferred from a file name's extension.
pub fn content_type(file_name: &str) -> Option<&'static str> {
    match extension(file_name).as_str() {
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Strip path components and characters outside `[A-Za-z0-9._-]`.
pub fn clean_file_name(file_name: &str) -> String {
    let base = Path::new(file_name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    base.chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            _ => None,
        })
        .collect()
}

fn random_prefix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FILE_ID_PREFIX_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

#[async_trait]
impl FileStore for LocalFileStore {
    fn validate(&self, file_name: &str, size: u64) -> Result<(), ResponseSignal> {
        let allowed = content_type(file_name)
            .is_some_and(|mime| self.allowed_types.iter().any(|t| t == mime));
        if !allowed {
            return Err(ResponseSignal::FileTypeNotSupported);
        }
        if size > self.max_size_bytes {
            return Err(ResponseSignal::FileSizeExceeded);
        }
        Ok(())
    }

    async fn save(
        &self,
        project_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<StoredFile, FileError> {
        let dir = self.project_dir(project_id);
        tokio::fs::create_dir_all(&dir).await?;

        // Retry on the (unlikely) event of a name collision.
        let clean = clean_file_name(file_name);
        let mut path = dir.join(format!("{}_{}", random_prefix(), clean));
        while tokio::fs::try_exists(&path).await? {
            path = dir.join(format!("{}_{}", random_prefix(), clean));
        }

        let mut writer = BufWriter::with_capacity(self.write_buffer, File::create(&path).await?);
        writer.write_all(content).await?;
        writer.flush().await?;
        let file_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        info!("Stored {} ({} bytes) for project {}", file_id, content.len(), project_id);
        Ok(StoredFile {
            file_id,
            path,
            size: content.len() as u64,
        })
    }

    async fn load(&self, project_id: &str, file_id: &str) -> Result<Vec<DocumentSection>, FileError> {
        let path = self.project_dir(project_id).join(clean_file_name(file_id));
        if !tokio::fs::try_exists(&path).await? {
            return Err(FileError::NotFound {
                project_id: project_id.to_string(),
                file_id: file_id.to_string(),
            });
        }

        match extension(file_id).as_str() {
            "txt" | "md" => {
                let text = tokio::fs::read_to_string(&path).await?;
                let mut metadata = Metadata::new();
                metadata.insert("source".to_string(), json!(path.to_string_lossy()));
                debug!("Loaded {} ({} chars)", file_id, text.chars().count());
                Ok(vec![DocumentSection { text, metadata }])
            }
            other => Err(FileError::Unsupported {
                file_id: file_id.to_string(),
                extension: other.to_string(),
            }),
        }
    }
}
