//! Chunk index on LanceDB
//!
//! Holds the propositions produced by the offline ingestion pipeline and
//! answers k-nearest-neighbour queries over their embeddings with cosine
//! distance.

use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::index::Index;
use lancedb::index::scalar::BTreeIndexBuilder;
use lancedb::index::vector::IvfHnswSqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MiseError, Result};
use crate::retrieval::{RetrievedChunk, SemanticIndex};
use crate::storage::table_exists;

pub const CHUNKS_TABLE: &str = "chunks";

/// Below this row count exhaustive search is used; the ANN index needs training data
const MIN_ROWS_FOR_VECTOR_INDEX: usize = 256;

/// One retrievable unit written by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub raw_content: String,
    /// Condensed restatement of `raw_content`; this is what retrieval returns
    pub proposition: String,
    /// Embedding of `proposition`
    pub embedding: Vec<f32>,
}

pub struct ChunkIndex {
    connection: Connection,
    table_name: String,
    dimension: usize,
    table: Option<Table>,
}

impl ChunkIndex {
    pub fn new(connection: Connection, table_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            connection,
            table_name: table_name.into(),
            dimension,
            table: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("raw_content", DataType::Utf8, false),
            Field::new("proposition", DataType::Utf8, false),
            Field::new(
                "text_embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ]))
    }

    pub async fn table_exists(&self) -> Result<bool> {
        table_exists(&self.connection, &self.table_name).await
    }

    pub async fn create_table(&mut self) -> Result<()> {
        let table = self
            .connection
            .create_empty_table(&self.table_name, Self::schema(self.dimension))
            .execute()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to create chunk table: {e}")))?;

        self.table = Some(table);
        Ok(())
    }

    pub async fn open_table(&mut self) -> Result<()> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to open chunk table: {e}")))?;

        self.table = Some(table);
        Ok(())
    }

    /// Open the table if it exists, otherwise create it empty
    pub async fn open_or_create(&mut self) -> Result<()> {
        if self.table_exists().await? {
            debug!("Opening existing {} table", self.table_name);
            self.open_table().await
        } else {
            info!("Creating {} table", self.table_name);
            self.create_table().await
        }
    }

    fn table(&self) -> Result<&Table> {
        self.table
            .as_ref()
            .ok_or_else(|| MiseError::StoreUnavailable("Chunk table not initialized".to_string()))
    }

    fn chunks_to_batch(&self, chunks: &[IndexedChunk]) -> Result<RecordBatch> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dimension) {
            return Err(MiseError::Embedding(format!(
                "Chunk '{}' has embedding dimension {}, index expects {}",
                bad.chunk_id,
                bad.embedding.len(),
                self.dimension
            )));
        }

        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        let raw: Vec<&str> = chunks.iter().map(|c| c.raw_content.as_str()).collect();
        let propositions: Vec<&str> = chunks.iter().map(|c| c.proposition.as_str()).collect();
        let embeddings: Vec<Option<Vec<Option<f32>>>> = chunks
            .iter()
            .map(|c| Some(c.embedding.iter().map(|&v| Some(v)).collect()))
            .collect();

        RecordBatch::try_new(
            Self::schema(self.dimension),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(raw)),
                Arc::new(StringArray::from(propositions)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                    embeddings,
                    self.dimension as i32,
                )),
            ],
        )
        .map_err(|e| MiseError::Serialization(format!("Failed to build chunk batch: {e}")))
    }

    /// Bulk-load chunks produced by the ingestion pipeline
    pub async fn load(&self, chunks: &[IndexedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let table = self.table()?;
        let batch = self.chunks_to_batch(chunks)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], Self::schema(self.dimension));

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to load chunks: {e}")))?;

        info!("Loaded {} chunks into {}", chunks.len(), self.table_name);
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        self.table()?
            .count_rows(None)
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to count rows: {e}")))
    }

    /// Build the `chunk_id` scalar index and, once there is enough data, the
    /// IVF-HNSW cosine index over `text_embedding`
    pub async fn create_indices(&self) -> Result<()> {
        let table = self.table()?;
        let rows = self.count().await?;
        if rows == 0 {
            return Ok(());
        }

        table
            .create_index(&["chunk_id"], Index::BTree(BTreeIndexBuilder::default()))
            .execute()
            .await
            .map_err(|e| {
                MiseError::StoreUnavailable(format!("Failed to create chunk_id index: {e}"))
            })?;

        if rows < MIN_ROWS_FOR_VECTOR_INDEX {
            debug!("{rows} rows, skipping vector index");
            return Ok(());
        }

        let hnsw = IvfHnswSqIndexBuilder::default().distance_type(DistanceType::Cosine);
        table
            .create_index(&["text_embedding"], Index::IvfHnswSq(hnsw))
            .execute()
            .await
            .map_err(|e| {
                MiseError::StoreUnavailable(format!("Failed to create vector index: {e}"))
            })?;

        Ok(())
    }

    fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>> {
        let chunk_ids = batch
            .column_by_name("chunk_id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| MiseError::StoreUnavailable("Failed to get chunk_id column".into()))?;
        let propositions = batch
            .column_by_name("proposition")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| {
                MiseError::StoreUnavailable("Failed to get proposition column".into())
            })?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let mut hits = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            // Cosine distance is 1 - cosine similarity
            let score = match distances {
                Some(d) if !d.is_null(row) => 1.0 - d.value(row),
                _ => 0.0,
            };
            hits.push(RetrievedChunk {
                chunk_id: chunk_ids.value(row).to_string(),
                content: propositions.value(row).to_string(),
                score,
            });
        }
        Ok(hits)
    }
}

#[async_trait]
impl SemanticIndex for ChunkIndex {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if embedding.len() != self.dimension {
            return Err(MiseError::Embedding(format!(
                "Query embedding dimension {} does not match index dimension {}",
                embedding.len(),
                self.dimension
            )));
        }

        let stream = self
            .table()?
            .query()
            .nearest_to(embedding)
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to create vector query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(|e| {
            MiseError::StoreUnavailable(format!("Failed to collect search results: {e}"))
        })?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(Self::batch_to_hits(batch)?);
        }
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "lance"
    }
}
