//! Recursive text chunking.
//!
//! Text is split on the highest-priority boundary present (paragraph, line,
//! sentence, word) and pieces are merged back greedily up to `chunk_size`
//! characters, carrying up to `overlap_size` trailing characters into the
//! next chunk. A piece that is still too large after merging is split again
//! with the next boundary down, ending in a hard character cut.
//!
//! Sizes are counted in Unicode scalar values, never bytes.

use std::collections::VecDeque;

use ragline_providers::Metadata;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Boundary tiers in priority order; separators within a tier are equal.
/// The empty separator means a character cut.
const SEPARATORS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "? ", "! "], &[" "], &[""]];

/// Errors that can occur when configuring the chunker.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("Overlap size {overlap_size} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge {
        chunk_size: usize,
        overlap_size: usize,
    },
}

/// A chunk of text cut from one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    /// Copied unchanged from the source section
    pub metadata: Metadata,
    /// Position within the source document, starting at 1
    pub ordinal: usize,
}

/// Splits document text into bounded, overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter {
    chunk_size: usize,
    overlap_size: usize,
}

impl ChunkSplitter {
    pub fn new(chunk_size: usize, overlap_size: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if overlap_size >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                chunk_size,
                overlap_size,
            });
        }
        Ok(Self {
            chunk_size,
            overlap_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    /// Split a single section of text.
    pub fn split(&self, text: &str, metadata: &Metadata) -> Vec<TextChunk> {
        self.split_document([(text, metadata)])
    }

    /// Split every section of one document, numbering chunks across all of
    /// them so ordinals stay contiguous for the document as a whole.
    pub fn split_document<'a, I>(&self, sections: I) -> Vec<TextChunk>
    where
        I: IntoIterator<Item = (&'a str, &'a Metadata)>,
    {
        let mut chunks = Vec::new();
        for (text, metadata) in sections {
            if text.trim().is_empty() {
                continue;
            }
            for piece in self.split_recursive(text, SEPARATORS) {
                chunks.push(TextChunk {
                    text: piece,
                    metadata: metadata.clone(),
                    ordinal: chunks.len() + 1,
                });
            }
        }

        debug!(
            "Split document into {} chunks (size={}, overlap={})",
            chunks.len(),
            self.chunk_size,
            self.overlap_size
        );
        chunks
    }

    fn split_recursive(&self, text: &str, tiers: &[&[&str]]) -> Vec<String> {
        // First tier present in the text; the character cut always applies.
        let (index, tier) = tiers
            .iter()
            .enumerate()
            .find(|(_, tier)| tier.iter().any(|sep| sep.is_empty() || text.contains(*sep)))
            .map(|(i, tier)| (i, *tier))
            .unwrap_or((tiers.len(), &[""][..]));
        let finer = tiers.get(index + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separators(text, tier) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Greedily join small pieces into chunks, keeping an overlap tail.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &join(&window));

                while total > self.overlap_size || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if !window.is_empty() {
            push_trimmed(&mut chunks, &join(&window));
        }
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split after any of `separators`, leaving each attached to the end of its
/// piece.
fn split_keeping_separators<'a>(text: &'a str, separators: &[&str]) -> Vec<&'a str> {
    if separators.iter().any(|sep| sep.is_empty()) {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < text.len() {
        match separators.iter().find(|sep| text[i..].starts_with(**sep)) {
            Some(sep) => {
                i += sep.len();
                pieces.push(&text[start..i]);
                start = i;
            }
            None => i += text[i..].chars().next().map_or(1, char::len_utf8),
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join(window: &VecDeque<(&str, usize)>) -> String {
    window.iter().map(|(piece, _)| *piece).collect()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
