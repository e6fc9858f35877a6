//! Chunking and vector indexing for ragline.
//!
//! This crate provides:
//! - Recursive, boundary-aware text chunking with overlap
//! - An indexing pipeline that embeds chunks and upserts them per project

pub mod chunker;
pub mod error;
pub mod indexer;

pub use chunker::{ChunkSplitter, ChunkerError, TextChunk};
pub use error::{IndexError, IndexStage};
pub use indexer::{collection_name, IndexStats, IndexerConfig, IndexingPipeline};
