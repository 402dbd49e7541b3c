//! On-disk artifacts: one vector index plus its parallel chunk list, stored under a key.
//!
//! Each save writes two files into the store root:
//! - `<key>.index`: the [`VectorIndex`] encoded with bincode
//! - `<key>.chunks`: the chunk list as JSON, in index order
//!
//! Both carry the same header (format version, generation id, record count). A key is
//! present only if both files exist, and [`ArtifactStore::load`] rejects a pair whose
//! headers disagree, so an index is never served with another save's chunks.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::chunks::Chunk;
use crate::vector_index::VectorIndex;

const INDEX_EXTENSION: &str = "index";
const CHUNKS_EXTENSION: &str = "chunks";
const FORMAT_VERSION: u32 = 1;

/// A loaded artifact. `index` position `i` corresponds to `chunks[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub index: VectorIndex,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Header {
    format_version: u32,
    generation: u64,
    count: u64,
}

/// Leading part of either file; decoded before the payload so a newer layout is
/// reported as a version problem instead of corruption.
#[derive(Deserialize)]
struct HeaderOnly {
    header: Header,
}

#[derive(Serialize, Deserialize)]
struct IndexFile<I> {
    header: Header,
    index: I,
}

#[derive(Serialize, Deserialize)]
struct ChunkFile<C> {
    header: Header,
    chunks: C,
}

/// Directory of persisted artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        self.part_path(key, INDEX_EXTENSION)
    }

    pub fn chunks_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        self.part_path(key, CHUNKS_EXTENSION)
    }

    /// True only when both parts of the artifact exist.
    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.index_path(key)?.is_file() && self.chunks_path(key)?.is_file())
    }

    /// Persist `index` and `chunks` under `key`, replacing any previous artifact.
    ///
    /// Both parts are fully written to temporary files before either is moved into
    /// place. The previous chunk list is kept aside until the index is in place, so a
    /// failed save leaves the previous artifact (or its absence) as it was.
    pub fn save(&self, key: &str, index: &VectorIndex, chunks: &[Chunk]) -> Result<(), StoreError> {
        let index_path = self.index_path(key)?;
        let chunks_path = self.chunks_path(key)?;
        if index.len() != chunks.len() {
            return Err(StoreError::CountMismatch {
                vectors: index.len(),
                chunks: chunks.len(),
            });
        }
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let header = Header {
            format_version: FORMAT_VERSION,
            generation: next_generation(),
            count: chunks.len() as u64,
        };
        let index_bytes = bincode::serialize(&IndexFile { header, index })
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        let chunk_bytes = serde_json::to_vec(&ChunkFile { header, chunks })
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        let index_tmp = self.write_temp(&index_bytes)?;
        let chunks_tmp = self.write_temp(&chunk_bytes)?;
        let backup = self.set_aside(&chunks_path, header.generation)?;
        if let Err(e) = persist(chunks_tmp, &chunks_path) {
            discard(backup.as_deref());
            return Err(e);
        }
        if let Err(e) = persist(index_tmp, &index_path) {
            tracing::warn!(key, error = %e, "index rename failed, restoring previous chunk list");
            restore(backup.as_deref(), &chunks_path);
            return Err(e);
        }
        discard(backup.as_deref());

        tracing::info!(
            key,
            chunks = chunks.len(),
            dimension = index.dimension(),
            generation = header.generation,
            "saved artifact"
        );
        Ok(())
    }

    /// Load the artifact for `key`. Returns `None` if either part is missing.
    pub fn load(&self, key: &str) -> Result<Option<Artifact>, StoreError> {
        let index_path = self.index_path(key)?;
        let chunks_path = self.chunks_path(key)?;
        let (Some(index_bytes), Some(chunk_bytes)) =
            (read_if_exists(&index_path)?, read_if_exists(&chunks_path)?)
        else {
            tracing::debug!(key, "artifact absent or incomplete");
            return Ok(None);
        };

        let index_header: HeaderOnly =
            bincode::deserialize(&index_bytes).map_err(|e| corrupt(&index_path, e))?;
        check_version(&index_path, index_header.header)?;
        let chunk_header: HeaderOnly =
            serde_json::from_slice(&chunk_bytes).map_err(|e| corrupt(&chunks_path, e))?;
        check_version(&chunks_path, chunk_header.header)?;

        let index_file: IndexFile<VectorIndex> =
            bincode::deserialize(&index_bytes).map_err(|e| corrupt(&index_path, e))?;
        index_file
            .index
            .validate()
            .map_err(|e| corrupt(&index_path, e))?;
        let chunk_file: ChunkFile<Vec<Chunk>> =
            serde_json::from_slice(&chunk_bytes).map_err(|e| corrupt(&chunks_path, e))?;

        if index_file.header != chunk_file.header {
            tracing::warn!(key, "index and chunk files come from different saves");
            return Err(StoreError::Mismatch(format!(
                "{key}: index generation {} ({} records) does not match chunks generation {} ({} records)",
                index_file.header.generation,
                index_file.header.count,
                chunk_file.header.generation,
                chunk_file.header.count,
            )));
        }
        let count = index_file.header.count;
        if index_file.index.len() as u64 != count || chunk_file.chunks.len() as u64 != count {
            tracing::warn!(key, "artifact record counts disagree");
            return Err(StoreError::Mismatch(format!(
                "{key}: header says {count} records, index has {}, chunk list has {}",
                index_file.index.len(),
                chunk_file.chunks.len(),
            )));
        }

        Ok(Some(Artifact {
            index: index_file.index,
            chunks: chunk_file.chunks,
        }))
    }

    /// The chunk list of a complete, consistent artifact.
    pub fn load_chunks(&self, key: &str) -> Result<Option<Vec<Chunk>>, StoreError> {
        Ok(self.load(key)?.map(|artifact| artifact.chunks))
    }

    fn part_path(&self, key: &str, extension: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{extension}")))
    }

    /// Hard-link (or copy) the current file at `path` next to it. `None` if there is none.
    fn set_aside(&self, path: &Path, generation: u64) -> Result<Option<PathBuf>, StoreError> {
        if !path.is_file() {
            return Ok(None);
        }
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{generation}.bak"));
        let backup = PathBuf::from(name);
        fs::hard_link(path, &backup)
            .or_else(|_| fs::copy(path, &backup).map(|_| ()))
            .map_err(|source| StoreError::Io {
                path: backup.clone(),
                source,
            })?;
        Ok(Some(backup))
    }

    fn write_temp(&self, bytes: &[u8]) -> Result<NamedTempFile, StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.root.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        Ok(tmp)
    }
}

/// Derive an artifact key from an uploaded file name: last path component, extension
/// stripped, anything outside `[A-Za-z0-9._-]` replaced by `_`. Returns `None` if
/// nothing usable is left.
pub fn artifact_key(file_name: &str) -> Option<String> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => base,
    };
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let key = sanitized.trim_matches(|c| c == '.' || c == '_');
    (!key.is_empty()).then(|| key.to_string())
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

fn check_version(path: &Path, header: Header) -> Result<(), StoreError> {
    if header.format_version == FORMAT_VERSION {
        Ok(())
    } else {
        Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: header.format_version,
        })
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn persist(tmp: NamedTempFile, target: &Path) -> Result<(), StoreError> {
    tmp.persist(target).map_err(|e| StoreError::Io {
        path: target.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Put the set-aside file back, or remove the new one if there was nothing before.
fn restore(backup: Option<&Path>, target: &Path) {
    let result = match backup {
        Some(backup) => fs::rename(backup, target),
        None => fs::remove_file(target),
    };
    if let Err(e) = result {
        tracing::error!(path = %target.display(), error = %e, "failed to roll back chunk list");
    }
}

fn discard(backup: Option<&Path>) {
    if let Some(backup) = backup {
        let _ = fs::remove_file(backup);
    }
}

fn corrupt(path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Distinct per save within a process and, via the clock, across processes.
fn next_generation() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    nanos.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid artifact key: {0:?}")]
    InvalidKey(String),
    #[error("cannot store {vectors} vectors with {chunks} chunks")]
    CountMismatch { vectors: usize, chunks: usize },
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to encode artifact: {0}")]
    Encode(String),
    #[error("corrupt artifact file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("unsupported artifact format version {version} in {path}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("inconsistent artifact: {0}")]
    Mismatch(String),
}
