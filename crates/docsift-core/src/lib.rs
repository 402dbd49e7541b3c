//! All backend logic independent of how the app is run (CLI or a web layer).
//!
//! Extracted page text goes in; overlapping chunks are embedded, indexed and persisted
//! under a key (see [store]). Searches load that artifact back and answer semantic or
//! keyword queries against it.

pub mod app_data;
pub mod blocks;
pub mod chunks;
pub mod config;
pub mod embed;
pub mod export;
pub mod ollama;
pub mod search;
pub mod store;
pub mod vector_index;

pub use app_data::{app_data_dir, default_processed_dir};
pub use blocks::{load_blocks, split_pages, BlocksError};
pub use chunks::{
    chunk_block, chunk_blocks, Chunk, ChunkError, ChunkOptions, PageBlock, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use config::{load_config, load_config_from, save_config, set_processed_dir, Config, ConfigError};
pub use embed::{EmbedError, Embedder};
pub use export::{report_file_name, to_csv_bytes, write_csv, ExportError};
pub use ollama::{OllamaEmbedder, OllamaError};
pub use search::{
    BuildSummary, SearchError, SearchMode, SearchResult, SearchService, DEFAULT_TOP_K,
    KEYWORD_SCORE,
};
pub use store::{artifact_key, Artifact, ArtifactStore, StoreError};
pub use vector_index::{Hit, IndexError, VectorIndex};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "docsift-core ready"
}
