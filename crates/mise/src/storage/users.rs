//! Durable user memory documents on LanceDB
//!
//! Each user is one row. The two sequences are stored as JSON-encoded
//! string arrays so a row reads back as the JSON memory document.
//! Mutations are read-modify-write followed by a point update on
//! `user_id`; a store-wide write lock makes each of them atomic.

use std::sync::Arc;

use arrow_array::{Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{MiseError, Result};
use crate::memory::store::MemoryStore;
use crate::memory::types::UserMemory;
use crate::storage::{sql_string, table_exists};

pub const USER_MEMORIES_TABLE: &str = "user_memories";

/// `MemoryStore` persisted in a LanceDB table
pub struct LanceMemoryStore {
    table: Table,
    max_messages: usize,
    /// Serializes every mutation on the table, across all users. LanceDB
    /// commits each update as a new table version and concurrent updates
    /// to one table can conflict, so writes are not keyed per user.
    write_lock: Mutex<()>,
}

impl LanceMemoryStore {
    /// Open the user memory table, creating it on first use
    pub async fn open(connection: &Connection, max_messages: usize) -> Result<Self> {
        let table = if table_exists(connection, USER_MEMORIES_TABLE).await? {
            debug!("Opening existing {} table", USER_MEMORIES_TABLE);
            connection
                .open_table(USER_MEMORIES_TABLE)
                .execute()
                .await
                .map_err(|e| {
                    MiseError::StoreUnavailable(format!("Failed to open user memory table: {e}"))
                })?
        } else {
            debug!("Creating {} table", USER_MEMORIES_TABLE);
            connection
                .create_empty_table(USER_MEMORIES_TABLE, Self::schema())
                .execute()
                .await
                .map_err(|e| {
                    MiseError::StoreUnavailable(format!(
                        "Failed to create user memory table: {e}"
                    ))
                })?
        };

        Ok(Self {
            table,
            max_messages,
            write_lock: Mutex::new(()),
        })
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Utf8, false),
            Field::new("recent_chat_history", DataType::Utf8, false),
            Field::new("relevant_info", DataType::Utf8, false),
        ]))
    }

    fn memory_to_batch(memory: &UserMemory) -> Result<RecordBatch> {
        let history = serde_json::to_string(&memory.recent_chat_history)?;
        let info = serde_json::to_string(&memory.relevant_info)?;

        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(StringArray::from(vec![memory.user_id.as_str()])),
                Arc::new(StringArray::from(vec![history.as_str()])),
                Arc::new(StringArray::from(vec![info.as_str()])),
            ],
        )
        .map_err(|e| MiseError::Serialization(format!("Failed to build user memory row: {e}")))
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| MiseError::StoreUnavailable(format!("Failed to get {name} column")))
    }

    fn batch_to_memory(batch: &RecordBatch, row: usize) -> Result<UserMemory> {
        let user_ids = Self::string_column(batch, "user_id")?;
        let histories = Self::string_column(batch, "recent_chat_history")?;
        let infos = Self::string_column(batch, "relevant_info")?;

        let user_id = user_ids.value(row).to_string();
        let recent_chat_history: Vec<String> =
            serde_json::from_str(histories.value(row)).map_err(|e| {
                MiseError::NotFound(format!(
                    "Malformed chat history in memory document for '{user_id}': {e}"
                ))
            })?;
        let relevant_info: Vec<String> = serde_json::from_str(infos.value(row)).map_err(|e| {
            MiseError::NotFound(format!(
                "Malformed relevant info in memory document for '{user_id}': {e}"
            ))
        })?;

        Ok(UserMemory {
            user_id,
            recent_chat_history,
            relevant_info,
        })
    }

    async fn read(&self, user_id: &str) -> Result<Option<UserMemory>> {
        let stream = self
            .table
            .query()
            .only_if(format!("user_id = {}", sql_string(user_id)))
            .limit(1)
            .execute()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to query user memory: {e}")))?;

        let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(|e| {
            MiseError::StoreUnavailable(format!("Failed to collect user memory: {e}"))
        })?;

        match batches.iter().find(|b| b.num_rows() > 0) {
            Some(batch) => Self::batch_to_memory(batch, 0).map(Some),
            None => Ok(None),
        }
    }

    async fn read_existing(&self, user_id: &str) -> Result<UserMemory> {
        self.read(user_id)
            .await?
            .ok_or_else(|| MiseError::NotFound(format!("no memory document for user '{user_id}'")))
    }

    async fn write(&self, memory: &UserMemory) -> Result<()> {
        let history = serde_json::to_string(&memory.recent_chat_history)?;
        let info = serde_json::to_string(&memory.relevant_info)?;

        let result = self
            .table
            .update()
            .only_if(format!("user_id = {}", sql_string(&memory.user_id)))
            .column("recent_chat_history", sql_string(&history))
            .column("relevant_info", sql_string(&info))
            .execute()
            .await
            .map_err(|e| {
                MiseError::StoreUnavailable(format!("Failed to update user memory: {e}"))
            })?;

        if result.rows_updated == 0 {
            return Err(MiseError::NotFound(format!(
                "no memory document for user '{}'",
                memory.user_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for LanceMemoryStore {
    async fn create_user(&self, user_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self.read(user_id).await?.is_some() {
            return Ok(());
        }

        let batch = Self::memory_to_batch(&UserMemory::new(user_id))?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], Self::schema());

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to seed user memory: {e}")))?;

        debug!(user_id, "Seeded memory document");
        Ok(())
    }

    async fn append_chat_message(&self, user_id: &str, message: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut memory = self.read_existing(user_id).await?;
        memory.push_chat_message(message, self.max_messages);
        self.write(&memory).await
    }

    async fn append_relevant_info(&self, user_id: &str, facts: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut memory = self.read_existing(user_id).await?;
        memory.extend_relevant_info(facts.iter().cloned());
        self.write(&memory).await
    }

    async fn fetch(&self, user_id: &str) -> Result<UserMemory> {
        self.read_existing(user_id).await
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut memory = self.read_existing(user_id).await?;
        memory.clear();
        self.write(&memory).await
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let stream = self
            .table
            .query()
            .execute()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to list users: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MiseError::StoreUnavailable(format!("Failed to collect users: {e}")))?;

        let mut ids = Vec::new();
        for batch in &batches {
            let user_ids = Self::string_column(batch, "user_id")?;
            for row in 0..user_ids.len() {
                ids.push(user_ids.value(row).to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn max_messages(&self) -> usize {
        self.max_messages
    }

    fn name(&self) -> &'static str {
        "lance"
    }
}
