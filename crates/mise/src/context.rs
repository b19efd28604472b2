//! Component wiring
//!
//! Builds the long-lived pieces from a `Config` once at startup. The
//! embedding model and the generation client are created on demand so
//! commands that only inspect storage need neither model weights nor an
//! API key.

use std::sync::Arc;
use std::time::Duration;

use lancedb::connection::Connection;
use tracing::info;

use crate::config::{Config, MemoryBackend};
use crate::embedding::{Embedder, EmbeddingModel};
use crate::error::{MiseError, Result};
use crate::extractor::SignalExtractor;
use crate::generation::{GenerationClient, GenerationParams, OpenAiClient};
use crate::memory::{InMemoryMemoryStore, MemoryStore};
use crate::orchestrator::Orchestrator;
use crate::retrieval::Retriever;
use crate::storage::{self, ChunkIndex, LanceMemoryStore};

pub struct AppContext {
    config: Config,
    connection: Connection,
    memory: Arc<dyn MemoryStore>,
}

impl AppContext {
    /// Connect storage and open the memory store
    ///
    /// `ephemeral` forces the in-process memory backend regardless of config.
    pub async fn open(config: Config, ephemeral: bool) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        info!("Initializing storage at: {}", data_dir.display());

        std::fs::create_dir_all(data_dir).map_err(|e| {
            MiseError::StoreUnavailable(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        let connection = storage::connect(data_dir).await?;

        let backend = if ephemeral {
            MemoryBackend::InMemory
        } else {
            config.memory.backend
        };
        let memory: Arc<dyn MemoryStore> = match backend {
            MemoryBackend::Lance => Arc::new(
                LanceMemoryStore::open(&connection, config.memory.max_messages).await?,
            ),
            MemoryBackend::InMemory => {
                Arc::new(InMemoryMemoryStore::new(config.memory.max_messages))
            }
        };
        info!("Memory backend: {}", memory.name());

        Ok(Self {
            config,
            connection,
            memory,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memory(&self) -> Arc<dyn MemoryStore> {
        self.memory.clone()
    }

    /// Open the chunk table, creating it empty when missing
    pub async fn chunk_index(&self) -> Result<ChunkIndex> {
        let mut index = ChunkIndex::new(
            self.connection.clone(),
            self.config.index.table.clone(),
            self.config.index.dimension,
        );
        index.open_or_create().await?;
        Ok(index)
    }

    /// Load the configured embedding model, checking it fits the index
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        info!("Initializing embedding model (this may take a moment on first run)...");
        let model = EmbeddingModel::from_name(
            &self.config.embedding.model,
            self.config.embedding.batch_size,
        )?;
        check_dimension(&model, self.config.index.dimension)?;
        info!("Embedding model initialized");
        Ok(Arc::new(model))
    }

    pub fn generation_client(&self) -> Result<Arc<dyn GenerationClient>> {
        Ok(Arc::new(OpenAiClient::new(&self.config.generation)?))
    }

    /// Assemble the turn pipeline over the real models
    pub async fn orchestrator(&self) -> Result<Orchestrator> {
        let client = self.generation_client()?;
        let embedder = self.embedder()?;
        let index = Arc::new(self.chunk_index().await?);
        Ok(self.orchestrator_with(client, embedder, index))
    }

    /// Assemble the turn pipeline over caller-supplied components
    pub fn orchestrator_with(
        &self,
        client: Arc<dyn GenerationClient>,
        embedder: Arc<dyn Embedder>,
        index: Arc<ChunkIndex>,
    ) -> Orchestrator {
        let params = GenerationParams::from(&self.config.generation);
        Orchestrator::new(
            self.memory.clone(),
            SignalExtractor::new(client.clone(), params),
            Retriever::new(embedder, index, self.config.index.top_k),
            client,
            params,
            self.config.orchestrator.clone(),
            Duration::from_secs(self.config.memory.store_timeout_secs),
        )
    }
}

fn check_dimension(embedder: &dyn Embedder, expected: usize) -> Result<()> {
    if embedder.dimension() != expected {
        return Err(MiseError::Embedding(format!(
            "Embedding model produces {}-dim vectors but index.dimension is {}",
            embedder.dimension(),
            expected
        )));
    }
    Ok(())
}
