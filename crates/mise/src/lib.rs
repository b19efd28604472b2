//! Mise - Memory-grounded recipe assistant
//!
//! Each conversational turn records the user's message, extracts durable
//! facts about the user, retrieves recipe propositions from a vector index,
//! and asks an LLM for an answer grounded in both.

pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod storage;
pub mod testing;

pub use error::MiseError;
