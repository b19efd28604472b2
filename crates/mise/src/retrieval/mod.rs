//! Grounding retrieval
//!
//! Embeds the user's query together with what we know about them and pulls
//! the top-K most similar propositions from the chunk index.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{MiseError, Result};

/// Default number of propositions returned per query
pub const DEFAULT_TOP_K: usize = 3;

/// A proposition returned by similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    /// The chunk's proposition text
    pub content: String,
    /// Cosine similarity to the query, higher is closer
    pub score: f32,
}

/// k-nearest-neighbour search over proposition embeddings
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Up to `k` hits ordered by descending score
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    fn name(&self) -> &'static str;
}

/// Text fed to the embedder for a query and the user's known facts
pub fn embedding_input(query: &str, relevant_info: &[String]) -> String {
    if relevant_info.is_empty() {
        return query.to_string();
    }
    format!("{query}\nUser relevant info: {}", relevant_info.join("; "))
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn SemanticIndex>,
    top_k: usize,
    search_timeout: Option<Duration>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn SemanticIndex>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
            search_timeout: None,
        }
    }

    /// Bound each index search; an expired search fails with `StoreUnavailable`
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = Some(timeout);
        self
    }

    /// Top-K hits for the query enriched with `relevant_info`, best first
    ///
    /// Equal scores keep the order the index returned them in.
    pub async fn retrieve_scored(
        &self,
        query: &str,
        relevant_info: &[String],
    ) -> Result<Vec<RetrievedChunk>> {
        let input = embedding_input(query, relevant_info);
        let embedder = Arc::clone(&self.embedder);
        let embedding = tokio::task::spawn_blocking(move || embedder.embed(&input))
            .await
            .map_err(|e| MiseError::Embedding(format!("Embedding task failed: {e}")))??;

        let search = self.index.search(&embedding, self.top_k);
        let mut hits = match self.search_timeout {
            Some(limit) => tokio::time::timeout(limit, search).await.map_err(|_| {
                MiseError::StoreUnavailable(format!(
                    "{} search timed out after {limit:?}",
                    self.index.name()
                ))
            })??,
            None => search.await?,
        };
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.top_k);

        debug!(
            index = self.index.name(),
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "Retrieved grounding context"
        );
        Ok(hits)
    }

    /// Propositions of the top-K hits joined by newlines; empty when nothing matched
    pub async fn retrieve(&self, query: &str, relevant_info: &[String]) -> Result<String> {
        let hits = self.retrieve_scored(query, relevant_info).await?;
        Ok(hits
            .into_iter()
            .map(|h| h.content)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
