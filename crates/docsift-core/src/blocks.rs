//! Reading extractor output from disk.
//!
//! PDF/DOCX extraction happens elsewhere; this accepts what an extractor leaves behind:
//! a JSON array of `{"page": n, "text": "..."}` objects, or plain text with one form
//! feed (`\x0c`) between pages, as `pdftotext` writes it.

use std::path::{Path, PathBuf};

use crate::chunks::PageBlock;

const PAGE_BREAK: char = '\x0c';

/// Load page blocks from `path`. `.json` files are parsed as a block list (pages are
/// numbered from 1); anything else is read as UTF-8 text and split into pages.
pub fn load_blocks(path: &Path) -> Result<Vec<PageBlock>, BlocksError> {
    let raw = std::fs::read_to_string(path).map_err(|e| BlocksError::Read(path.to_path_buf(), e))?;
    let is_json = path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("json"));
    if is_json {
        let blocks: Vec<PageBlock> =
            serde_json::from_str(&raw).map_err(|e| BlocksError::Parse(path.to_path_buf(), e))?;
        if let Some(position) = blocks.iter().position(|b| b.page == 0) {
            return Err(BlocksError::InvalidPage(path.to_path_buf(), position));
        }
        Ok(blocks)
    } else {
        Ok(split_pages(&raw))
    }
}

/// Split text on form feeds into pages numbered from 1. Blank pages are dropped but
/// still count toward the numbering.
pub fn split_pages(text: &str) -> Vec<PageBlock> {
    text.split(PAGE_BREAK)
        .zip(1u32..)
        .filter(|(page_text, _)| !page_text.trim().is_empty())
        .map(|(page_text, page)| PageBlock::new(page, page_text))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum BlocksError {
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid page blocks in {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("block {1} in {0} has page 0; pages are numbered from 1")]
    InvalidPage(PathBuf, usize),
}
