//! Memory store trait
//!
//! Abstracts the durable home of user memory documents so the turn
//! pipeline can run against LanceDB in production and an in-process map
//! in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::types::UserMemory;

/// Durable, per-user bounded conversational state
///
/// Every write is visible to a `fetch` issued afterwards by the same caller.
/// Writes to a user that was never seeded fail with `MiseError::NotFound`.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Seed an empty memory document; no-op if the user already exists
    async fn create_user(&self, user_id: &str) -> Result<()>;

    /// Append a message to the chat history, evicting the oldest entry past capacity
    async fn append_chat_message(&self, user_id: &str, message: &str) -> Result<()>;

    /// Append facts in iteration order without deduplication
    async fn append_relevant_info(&self, user_id: &str, facts: &[String]) -> Result<()>;

    /// Snapshot of the user's memory document
    async fn fetch(&self, user_id: &str) -> Result<UserMemory>;

    /// Reset history and facts to empty
    async fn clear(&self, user_id: &str) -> Result<()>;

    /// All seeded user ids, sorted
    async fn list_users(&self) -> Result<Vec<String>>;

    /// Capacity of the chat history window
    fn max_messages(&self) -> usize;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
