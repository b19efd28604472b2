//! Test utilities for mise - deterministic models and fixtures
//!
//! `MockEmbeddingModel` stands in for the fastembed model so tests that
//! exercise retrieval run without downloading weights.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::embedding::{EMBEDDING_DIMENSION, Embedder};
use crate::error::Result;

/// Mock embedding model for fast tests that don't need real ML.
///
/// Produces a normalized hashed bag-of-words vector: every lowercase
/// alphanumeric token bumps one bucket. Texts sharing words point in
/// similar directions, so cosine ranking behaves sensibly in tests.
#[derive(Debug, Clone)]
pub struct MockEmbeddingModel {
    dimension: usize,
}

impl Default for MockEmbeddingModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingModel {
    /// Mock with the production embedding dimension
    pub fn new() -> Self {
        Self::with_dimension(EMBEDDING_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() % self.dimension as u64) as usize
    }
}

impl Embedder for MockEmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        } else {
            // Empty text still needs a non-zero vector for cosine search
            vector[0] = 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity of two vectors; 0.0 when either has zero length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
