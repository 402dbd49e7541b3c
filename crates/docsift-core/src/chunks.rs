//! Splits extracted page text into overlapping word windows for embedding and search.
//! Every chunk keeps the page number of the block it came from.

use serde::{Deserialize, Serialize};

/// Default window length in words.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default number of words shared by consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// One logical page (or unit) of text produced by an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlock {
    pub page: u32,
    pub text: String,
}

impl PageBlock {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// A window of words from a page block, with its source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
}

/// Window size and overlap, validated so the window always moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    size: usize,
    overlap: usize,
}

impl ChunkOptions {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if size == 0 {
            return Err(ChunkError::ZeroSize);
        }
        if overlap >= size {
            return Err(ChunkError::OverlapTooLarge { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Words the window advances by each step. Always >= 1.
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Chunk a single block. Empty or whitespace-only text yields no chunks.
pub fn chunk_block(block: &PageBlock, options: &ChunkOptions) -> Vec<Chunk> {
    let words: Vec<&str> = block.text.split_whitespace().collect();
    word_windows(&words, options)
        .into_iter()
        .map(|text| Chunk {
            text,
            page: block.page,
        })
        .collect()
}

/// Chunk all blocks. Returns chunks in block order, then window order.
pub fn chunk_blocks(blocks: &[PageBlock], options: &ChunkOptions) -> Vec<Chunk> {
    blocks
        .iter()
        .flat_map(|b| chunk_block(b, options))
        .collect()
}

/// Slides the window until one reaches the last word.
fn word_windows(words: &[&str], options: &ChunkOptions) -> Vec<String> {
    let mut windows = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + options.size).min(words.len());
        windows.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += options.stride();
    }
    windows
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size must be at least one word")]
    ZeroSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}
