//! Persisted config (artifact directory, chunking, embedder) in the app data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::{ChunkError, ChunkOptions, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL};
use crate::search::DEFAULT_TOP_K;

const CONFIG_FILENAME: &str = "config.toml";

/// Every field is optional; unset fields fall back to the defaults below.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where `<key>.index` / `<key>.chunks` are written. Default: `<app data>/processed`.
    pub processed_dir: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub ollama_url: Option<String>,
    pub embed_model: Option<String>,
}

impl Config {
    pub fn processed_dir(&self) -> Result<PathBuf, ConfigError> {
        match self.processed_dir.as_deref().filter(|s| !s.is_empty()) {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => app_data::default_processed_dir().ok_or(ConfigError::NoDataDir),
        }
    }

    /// Validated chunking options; an overlap not smaller than the size is rejected here.
    pub fn chunk_options(&self) -> Result<ChunkOptions, ConfigError> {
        ChunkOptions::new(
            self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
        )
        .map_err(ConfigError::Chunking)
    }

    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn embed_model(&self) -> &str {
        self.embed_model.as_deref().unwrap_or(DEFAULT_EMBED_MODEL)
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    match app_data::app_data_dir() {
        Some(dir) => load_config_from(&dir.join(CONFIG_FILENAME)),
        None => Config::default(),
    }
}

/// Load config from an explicit file. Returns default config if missing or invalid.
pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
        Config::default()
    })
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Set and persist the artifact directory.
pub fn set_processed_dir(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(ConfigError::Write)?;
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = load_config();
    config.processed_dir = Some(path.to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("invalid chunking settings: {0}")]
    Chunking(ChunkError),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        assert_eq!(load_config_from(&path), Config::default());
        std::fs::write(&path, "chunk_size = \"lots\"").unwrap();
        assert_eq!(load_config_from(&path), Config::default());

        let config = Config::default();
        assert_eq!(config.top_k(), DEFAULT_TOP_K);
        assert_eq!(config.ollama_url(), DEFAULT_BASE_URL);
        assert_eq!(config.embed_model(), DEFAULT_EMBED_MODEL);
        assert_eq!(config.chunk_options().unwrap(), ChunkOptions::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let config = Config {
            processed_dir: Some("/srv/docsift".into()),
            chunk_size: Some(200),
            chunk_overlap: Some(20),
            top_k: Some(8),
            ollama_url: None,
            embed_model: Some("all-minilm".into()),
        };
        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.processed_dir().unwrap(), PathBuf::from("/srv/docsift"));
        assert_eq!(loaded.chunk_options().unwrap().stride(), 180);
        assert_eq!(loaded.top_k(), 8);
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        let config = Config {
            chunk_size: Some(50),
            chunk_overlap: Some(50),
            ..Config::default()
        };
        assert!(matches!(
            config.chunk_options(),
            Err(ConfigError::Chunking(ChunkError::OverlapTooLarge { .. }))
        ));
    }
}
