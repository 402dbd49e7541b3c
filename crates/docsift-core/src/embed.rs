//! The embedding capability the search pipeline depends on.
//!
//! Implementations map texts to vectors of one fixed dimension. The production
//! implementation is [`crate::ollama::OllamaEmbedder`]; tests use fixed vectors.

use crate::ollama::OllamaError;

/// Maps a batch of texts to one embedding vector per text.
///
/// Must be deterministic for a fixed model and return the same dimension for every call.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or(EmbedError::MissingOutput)
    }
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        (**self).embed(texts)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding backend error: {0}")]
    Ollama(#[from] OllamaError),
    #[error("embedder returned no vector")]
    MissingOutput,
    #[error("embedder failed: {0}")]
    Other(String),
}
