//! Ollama-backed embedder. Wraps ollama-rs behind the blocking [`Embedder`] API.

use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use thiserror::Error;
use tokio::runtime::Runtime;

use crate::embed::{EmbedError, Embedder};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Embeds text through a local Ollama server.
///
/// Owns a single-threaded runtime created once at construction and drives each request
/// to completion on it, so callers see plain blocking calls. Do not call from inside
/// another tokio runtime.
#[derive(Debug)]
pub struct OllamaEmbedder {
    inner: Ollama,
    embed_model: String,
    runtime: Runtime,
}

impl OllamaEmbedder {
    /// Create from URL string, e.g. `http://localhost:11434`.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(OllamaError::Runtime)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            runtime,
        })
    }

    /// Create with default localhost:11434.
    pub fn local() -> Result<Self, OllamaError> {
        Self::from_url(DEFAULT_BASE_URL)
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    /// Embed multiple strings in one request. Returns one embedding per input.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let res = self
            .runtime
            .block_on(self.inner.generate_embeddings(req))
            .map_err(OllamaError::Request)?;
        tracing::debug!(
            model = %self.embed_model,
            inputs = texts.len(),
            outputs = res.embeddings.len(),
            "ollama embeddings"
        );
        Ok(res.embeddings)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(self.embed_batch(texts)?)
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("failed to start embedding runtime: {0}")]
    Runtime(std::io::Error),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
}
