//! Per-user conversational memory
//!
//! Each user owns one memory document: a bounded window of recent chat
//! messages and an append-only list of facts extracted from what they said.

pub mod inmemory;
pub mod store;
pub mod types;

pub use inmemory::InMemoryMemoryStore;
pub use store::MemoryStore;
pub use types::{DEFAULT_MAX_MESSAGES, UserMemory};
