//! Process-local memory store backed by `DashMap`

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{MiseError, Result};
use crate::memory::store::MemoryStore;
use crate::memory::types::{DEFAULT_MAX_MESSAGES, UserMemory};

/// Memory store that lives for the lifetime of the process
///
/// Each mutation runs under the map's shard lock for that user, so the
/// history bound is applied atomically per write.
#[derive(Debug)]
pub struct InMemoryMemoryStore {
    users: DashMap<String, UserMemory>,
    max_messages: usize,
}

impl InMemoryMemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            users: DashMap::new(),
            max_messages,
        }
    }

    fn not_found(user_id: &str) -> MiseError {
        MiseError::NotFound(format!("no memory document for user '{user_id}'"))
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn create_user(&self, user_id: &str) -> Result<()> {
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| UserMemory::new(user_id));
        Ok(())
    }

    async fn append_chat_message(&self, user_id: &str, message: &str) -> Result<()> {
        let mut memory = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::not_found(user_id))?;
        memory.push_chat_message(message, self.max_messages);
        Ok(())
    }

    async fn append_relevant_info(&self, user_id: &str, facts: &[String]) -> Result<()> {
        let mut memory = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::not_found(user_id))?;
        memory.extend_relevant_info(facts.iter().cloned());
        Ok(())
    }

    async fn fetch(&self, user_id: &str) -> Result<UserMemory> {
        self.users
            .get(user_id)
            .map(|m| m.clone())
            .ok_or_else(|| Self::not_found(user_id))
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let mut memory = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::not_found(user_id))?;
        memory.clear();
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.users.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    fn max_messages(&self) -> usize {
        self.max_messages
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
