//! Exact inner-product index over L2-normalized vectors (cosine similarity).
//!
//! Built once from the full embedding matrix; there is no incremental add. Rows are
//! addressed by their 0-based insertion position, which callers use to find the chunk
//! the vector was computed from.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A search hit: insertion position of the vector and its cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub position: usize,
    pub score: f32,
}

/// Normalized vectors stored row-major in one contiguous buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index over all rows. Every row must have the same, non-zero length.
    /// An empty matrix builds an empty index.
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        let Some(first) = vectors.first() else {
            return Ok(Self::default());
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (position, v) in vectors.iter().enumerate() {
            if v.len() != dimension {
                return Err(IndexError::Ragged {
                    position,
                    expected: dimension,
                    actual: v.len(),
                });
            }
            data.extend(normalize(v));
        }
        Ok(Self { dimension, data })
    }

    /// Up to `k` positions with the highest cosine similarity to `query`, best first.
    /// Equal scores keep insertion order. An empty index returns no hits.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let q = normalize(query);
        let mut hits: Vec<Hit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Hit {
                position,
                score: dot(&q, row),
            })
            .collect();
        hits.sort_by(|a, b| rank(a, b));
        hits.truncate(k);
        Ok(hits)
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector length, or 0 for an empty index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The stored (normalized) vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimension.max(1)).nth(position)
    }

    /// Checks the buffer holds whole rows. Used after deserializing.
    pub(crate) fn validate(&self) -> Result<(), IndexError> {
        let whole_rows = match self.dimension {
            0 => self.data.is_empty(),
            d => self.data.len() % d == 0,
        };
        if whole_rows {
            Ok(())
        } else {
            Err(IndexError::Truncated {
                dimension: self.dimension,
                values: self.data.len(),
            })
        }
    }
}

fn rank(a: &Hit, b: &Hit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

/// Scales to unit length. A zero vector stays zero.
fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding vectors must have at least one dimension")]
    ZeroDimension,
    #[error("vector {position} has {actual} dimensions, expected {expected}")]
    Ragged {
        position: usize,
        expected: usize,
        actual: usize,
    },
    #[error("query has {actual} dimensions but the index was built with {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index holds {values} values, not a whole number of {dimension}-dimensional rows")]
    Truncated { dimension: usize, values: usize },
}
