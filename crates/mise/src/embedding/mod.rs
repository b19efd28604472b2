//! Text embedding
//!
//! `EmbeddingModel` runs a local fastembed model. Query embeddings must use
//! the same model the ingestion pipeline used for the indexed propositions.

use std::sync::Mutex;

use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::error::{MiseError, Result};

/// Dimension of every supported model
pub const EMBEDDING_DIMENSION: usize = 384;

/// Synchronous text embedder
///
/// Implementations are CPU bound; async callers run them on the blocking pool.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;
}

pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    batch_size: usize,
}

impl EmbeddingModel {
    /// Load the default model (all-MiniLM-L6-v2)
    pub fn new() -> Result<Self> {
        Self::from_name("all-minilm-l6-v2", 32)
    }

    /// Load a model by its config name
    pub fn from_name(name: &str, batch_size: usize) -> Result<Self> {
        let model = match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" => FastEmbedModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => FastEmbedModel::BGESmallENV15,
            "multilingual-e5-small" => FastEmbedModel::MultilingualE5Small,
            other => {
                return Err(MiseError::Config(format!(
                    "Unknown embedding model '{other}'"
                )));
            }
        };

        let model = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|e| MiseError::Embedding(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(model),
            batch_size: batch_size.max(1),
        })
    }
}

impl Embedder for EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| MiseError::Embedding("Embedding model lock poisoned".to_string()))?;
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| MiseError::Embedding(e.to_string()))?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MiseError::Embedding("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| MiseError::Embedding("Embedding model lock poisoned".to_string()))?;
        model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| MiseError::Embedding(e.to_string()))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}
