//! Build pipeline (chunk → embed → index → persist) and queries against a persisted artifact.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chunks::{chunk_blocks, ChunkOptions, PageBlock};
use crate::embed::{EmbedError, Embedder};
use crate::export;
use crate::store::{Artifact, ArtifactStore, StoreError};
use crate::vector_index::{IndexError, VectorIndex};

/// Default number of semantic results.
pub const DEFAULT_TOP_K: usize = 5;

/// Score given to every keyword match.
pub const KEYWORD_SCORE: f32 = 1.0;

/// One result returned to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub page: u32,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Semantic,
    Keyword,
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            other => Err(SearchError::UnknownMode(other.to_string())),
        }
    }
}

/// What a successful build produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub key: String,
    pub chunks: usize,
    pub dimension: usize,
}

/// Ties the chunker, an embedder and an artifact store together.
///
/// Independent keys can be built and searched from different threads. Writes to the
/// same key must be serialized by the caller.
#[derive(Debug)]
pub struct SearchService<E> {
    store: ArtifactStore,
    embedder: E,
    options: ChunkOptions,
}

impl<E: Embedder> SearchService<E> {
    pub fn new(store: ArtifactStore, embedder: E, options: ChunkOptions) -> Self {
        Self {
            store,
            embedder,
            options,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn chunk_options(&self) -> &ChunkOptions {
        &self.options
    }

    /// Chunk, embed and index `blocks`, then persist the result under `key`.
    ///
    /// Any previous artifact for `key` is replaced only if every step succeeds.
    pub fn build_and_persist(
        &self,
        blocks: &[PageBlock],
        key: &str,
    ) -> Result<BuildSummary, SearchError> {
        let replacing = self.store.exists(key)?;
        let chunks = chunk_blocks(blocks, &self.options);
        if chunks.is_empty() {
            return Err(SearchError::EmptyInput);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts)?;
        if embeddings.len() != chunks.len() {
            return Err(SearchError::EmbeddingCount {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let index = VectorIndex::build(&embeddings)?;
        self.store.save(key, &index, &chunks)?;
        tracing::info!(
            key,
            blocks = blocks.len(),
            chunks = chunks.len(),
            dimension = index.dimension(),
            replacing,
            "built index"
        );
        Ok(BuildSummary {
            key: key.to_string(),
            chunks: chunks.len(),
            dimension: index.dimension(),
        })
    }

    /// Up to `k` chunks ranked by cosine similarity to `query`.
    pub fn semantic_search(
        &self,
        query: &str,
        key: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let artifact = self.load(key)?;
        let query_vector = self.embedder.embed_one(query)?;
        let hits = artifact.index.search(&query_vector, k)?;
        tracing::debug!(key, k, hits = hits.len(), "semantic search");

        hits.into_iter()
            .map(|hit| -> Result<SearchResult, SearchError> {
                let chunk = artifact.chunks.get(hit.position).ok_or(
                    SearchError::InternalConsistency {
                        position: hit.position,
                        chunks: artifact.chunks.len(),
                    },
                )?;
                Ok(SearchResult {
                    text: chunk.text.clone(),
                    page: chunk.page,
                    score: hit.score,
                })
            })
            .collect()
    }

    /// Every chunk containing `query`, ignoring case, in chunk order. An empty query
    /// matches every chunk.
    pub fn keyword_search(&self, query: &str, key: &str) -> Result<Vec<SearchResult>, SearchError> {
        let artifact = self.load(key)?;
        let needle = query.to_lowercase();
        let results: Vec<SearchResult> = artifact
            .chunks
            .into_iter()
            .filter(|c| c.text.to_lowercase().contains(&needle))
            .map(|c| SearchResult {
                text: c.text,
                page: c.page,
                score: KEYWORD_SCORE,
            })
            .collect();
        tracing::debug!(key, matches = results.len(), "keyword search");
        Ok(results)
    }

    /// Run a query in the given mode. `k` only applies to semantic search.
    pub fn search(
        &self,
        query: &str,
        key: &str,
        mode: SearchMode,
        k: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        match mode {
            SearchMode::Semantic => self.semantic_search(query, key, k),
            SearchMode::Keyword => self.keyword_search(query, key),
        }
    }

    /// The artifact's chunks as a spreadsheet-friendly CSV (see [`export::write_csv`]).
    pub fn export_csv(&self, key: &str) -> Result<Vec<u8>, SearchError> {
        let chunks = self
            .store
            .load_chunks(key)?
            .ok_or_else(|| SearchError::NotFound(key.to_string()))?;
        Ok(export::to_csv_bytes(&chunks)?)
    }

    fn load(&self, key: &str) -> Result<Artifact, SearchError> {
        self.store
            .load(key)?
            .ok_or_else(|| SearchError::NotFound(key.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("no text to index: the document produced no chunks")]
    EmptyInput,
    #[error("unknown search mode: {0:?} (expected \"semantic\" or \"keyword\")")]
    UnknownMode(String),
    #[error("no processed data for {0:?}")]
    NotFound(String),
    #[error("embedder returned {actual} vectors for {expected} chunks")]
    EmbeddingCount { expected: usize, actual: usize },
    #[error("search hit at position {position} but the artifact has only {chunks} chunks")]
    InternalConsistency { position: usize, chunks: usize },
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("export error: {0}")]
    Export(#[from] export::ExportError),
}

impl SearchError {
    /// True when the caller should answer "not found" rather than fail.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::chunks::Chunk;

    /// Bag-of-letters embedder: counts of a, b, c, d in the text.
    #[derive(Default)]
    struct Letters {
        calls: AtomicUsize,
    }

    impl Embedder for Letters {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    ['a', 'b', 'c', 'd']
                        .iter()
                        .map(|l| t.chars().filter(|c| c == l).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    struct Fixed(Vec<Vec<f32>>);

    impl Embedder for Fixed {
        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(self.0.clone())
        }
    }

    fn service<E: Embedder>(dir: &tempfile::TempDir, embedder: E) -> SearchService<E> {
        SearchService::new(
            ArtifactStore::new(dir.path()),
            embedder,
            ChunkOptions::new(2, 0).unwrap(),
        )
    }

    fn blocks() -> Vec<PageBlock> {
        vec![
            PageBlock::new(1, "aaa aab"),
            PageBlock::new(2, "bbb Bbc ccc cca"),
            PageBlock::new(3, "ddd"),
        ]
    }

    #[test]
    fn build_then_semantic_search_maps_positions_to_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        let summary = svc.build_and_persist(&blocks(), "doc").unwrap();
        assert_eq!(summary.chunks, 4);
        assert_eq!(summary.dimension, 4);

        let results = svc.semantic_search("cc", "doc", DEFAULT_TOP_K).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].text, "ccc cca");
        assert_eq!(results[0].page, 2);
        assert!((results[0].score - 5.0 / 26f32.sqrt()).abs() < 1e-5);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        let artifact = svc.store().load("doc").unwrap().unwrap();
        for r in &results {
            assert!(artifact
                .chunks
                .contains(&Chunk { text: r.text.clone(), page: r.page }));
        }
    }

    #[test]
    fn k_larger_than_index_returns_everything_once() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        svc.build_and_persist(&[PageBlock::new(1, "ab cd ad")], "small")
            .unwrap();
        let results = svc.semantic_search("a", "small", 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "ad");
        assert_eq!(results[1].text, "ab cd");
    }

    #[test]
    fn keyword_search_is_case_insensitive_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        svc.build_and_persist(&blocks(), "doc").unwrap();

        let first = svc.keyword_search("BB", "doc").unwrap();
        let texts: Vec<&str> = first.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["bbb Bbc"]);
        assert!(first.iter().all(|r| r.score == KEYWORD_SCORE));

        let a = svc.keyword_search("a", "doc").unwrap();
        let pages: Vec<u32> = a.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(a, svc.keyword_search("a", "doc").unwrap());
    }

    #[test]
    fn empty_input_writes_nothing_and_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        assert!(matches!(
            svc.build_and_persist(&[], "doc"),
            Err(SearchError::EmptyInput)
        ));
        assert!(!svc.store().exists("doc").unwrap());

        svc.build_and_persist(&blocks(), "doc").unwrap();
        let before = svc.store().load("doc").unwrap();
        assert!(matches!(
            svc.build_and_persist(&[PageBlock::new(1, "   ")], "doc"),
            Err(SearchError::EmptyInput)
        ));
        assert_eq!(svc.store().load("doc").unwrap(), before);
        assert_eq!(svc.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rebuild_replaces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        svc.build_and_persist(&blocks(), "doc").unwrap();
        svc.build_and_persist(&[PageBlock::new(9, "dd")], "doc").unwrap();
        let chunks = svc.store().load_chunks("doc").unwrap().unwrap();
        assert_eq!(chunks, vec![Chunk { text: "dd".into(), page: 9 }]);
    }

    #[test]
    fn building_twice_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        svc.build_and_persist(&blocks(), "one").unwrap();
        svc.build_and_persist(&blocks(), "two").unwrap();
        let one = svc.store().load("one").unwrap().unwrap();
        let two = svc.store().load("two").unwrap().unwrap();
        assert_eq!(one, two);
        assert_eq!(
            svc.semantic_search("abcd", "one", 4).unwrap(),
            svc.semantic_search("abcd", "two", 4).unwrap()
        );
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        let err = svc.semantic_search("a", "ghost", 5).unwrap_err();
        assert!(err.is_not_found());
        assert!(svc.keyword_search("a", "ghost").unwrap_err().is_not_found());
        assert!(svc.export_csv("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn empty_keyword_query_returns_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        svc.build_and_persist(&blocks(), "doc").unwrap();
        let chunks = svc.store().load_chunks("doc").unwrap().unwrap();

        let results = svc.search("", "doc", SearchMode::Keyword, 5).unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        let expected: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, expected);
        assert!(results.iter().all(|r| r.score == KEYWORD_SCORE));
    }

    #[test]
    fn empty_semantic_query_is_embedded_like_any_other() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        svc.build_and_persist(&blocks(), "doc").unwrap();
        let results = svc.semantic_search("", "doc", 2).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn embedder_dimension_change_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let builder = SearchService::new(
            store.clone(),
            Fixed(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
            ChunkOptions::new(1, 0).unwrap(),
        );
        builder
            .build_and_persist(&[PageBlock::new(1, "x y")], "doc")
            .unwrap();

        let querier = SearchService::new(store, Fixed(vec![vec![1.0, 0.0, 0.0]]), ChunkOptions::default());
        assert!(matches!(
            querier.semantic_search("x", "doc", 5),
            Err(SearchError::Index(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }))
        ));
    }

    #[test]
    fn wrong_number_of_embeddings_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Fixed(vec![vec![1.0]]));
        assert!(matches!(
            svc.build_and_persist(&[PageBlock::new(1, "a b c d")], "doc"),
            Err(SearchError::EmbeddingCount {
                expected: 2,
                actual: 1
            })
        ));
        assert!(!svc.store().exists("doc").unwrap());
    }

    #[test]
    fn independent_keys_build_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Letters::default());
        std::thread::scope(|s| {
            for key in ["k0", "k1", "k2", "k3"] {
                let svc = &svc;
                s.spawn(move || svc.build_and_persist(&blocks(), key).unwrap());
            }
        });
        for key in ["k0", "k1", "k2", "k3"] {
            assert_eq!(svc.keyword_search("ddd", key).unwrap().len(), 1);
        }
    }

    #[test]
    fn search_mode_parses() {
        assert_eq!("Keyword".parse::<SearchMode>().unwrap(), SearchMode::Keyword);
        assert_eq!(" semantic ".parse::<SearchMode>().unwrap(), SearchMode::Semantic);
        assert!("fuzzy".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::default(), SearchMode::Semantic);
    }
}
