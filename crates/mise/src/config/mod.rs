use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{MiseError, Result};

/// Environment variable overriding `storage.data_dir`
pub const DATA_DIR_ENV: &str = "MISE_DATA_DIR";
/// Environment variable overriding `generation.api_url`
pub const API_URL_ENV: &str = "MISE_API_URL";

/// Main configuration structure for Mise
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// On-disk storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-user conversational memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Semantic index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Generative model configuration
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Turn pipeline configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Apply `MISE_DATA_DIR` and `MISE_API_URL` on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(api_url) = std::env::var(API_URL_ENV) {
            if !api_url.is_empty() {
                self.generation.api_url = api_url;
            }
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.generation.api_url).map_err(|e| {
            MiseError::Config(format!(
                "Invalid generation.api_url '{}': {e}",
                self.generation.api_url
            ))
        })?;

        if self.memory.max_messages == 0 {
            return Err(MiseError::Config(
                "memory.max_messages must be at least 1".to_string(),
            ));
        }
        if self.index.top_k == 0 {
            return Err(MiseError::Config(
                "index.top_k must be at least 1".to_string(),
            ));
        }
        if self.index.dimension == 0 {
            return Err(MiseError::Config(
                "index.dimension must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(MiseError::Config(format!(
                "generation.temperature must be within 0.0-2.0, got {}",
                self.generation.temperature
            )));
        }
        Ok(())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for the LanceDB database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".mise"))
        .unwrap_or_else(|| PathBuf::from(".mise"))
}

/// Where user memory documents live
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    /// Durable LanceDB table under `storage.data_dir`
    #[default]
    Lance,
    /// Process-local map, lost on exit
    InMemory,
}

/// Per-user memory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Storage backend for user memory documents
    #[serde(default)]
    pub backend: MemoryBackend,
    /// Capacity of the recent chat history window
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Timeout applied to each memory store call, in seconds
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::default(),
            max_messages: default_max_messages(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_max_messages() -> usize {
    5
}

fn default_store_timeout_secs() -> u64 {
    10
}

/// Semantic index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Table holding indexed chunks
    #[serde(default = "default_index_table")]
    pub table: String,
    /// Embedding dimension of the `text_embedding` column
    #[serde(default = "default_index_dimension")]
    pub dimension: usize,
    /// Number of propositions retrieved per turn
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            table: default_index_table(),
            dimension: default_index_dimension(),
            top_k: default_top_k(),
        }
    }
}

fn default_index_table() -> String {
    "chunks".to_string()
}

fn default_index_dimension() -> usize {
    384
}

fn default_top_k() -> usize {
    3
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (all-minilm-l6-v2, bge-small-en-v1.5, multilingual-e5-small)
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Batch size used when embedding many propositions
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}

fn default_embedding_batch_size() -> usize {
    32
}

/// Generative model configuration (OpenAI-compatible API)
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// API base URL; `/chat/completions` is appended
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model identifier
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// Sampling temperature sent with every request
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Sampling seed sent with every request
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Retries on rate limiting or transport errors (0 = fail fast)
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            model: default_generation_model(),
            timeout_secs: default_generation_timeout_secs(),
            temperature: default_temperature(),
            seed: default_seed(),
            max_retries: 0,
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.1
}

fn default_seed() -> u64 {
    42
}

/// Whether a non-task utterance may be answered without retrieval
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShortCircuitPolicy {
    /// Every turn goes through retrieval and generation
    #[default]
    Disabled,
    /// A categorized "other" utterance with a direct answer ends the turn early
    DirectAnswer,
}

/// Turn pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Short-circuit policy for non-task utterances
    #[serde(default)]
    pub short_circuit: ShortCircuitPolicy,
    /// Prefix marking assistant entries in the chat history
    #[serde(default = "default_bot_prefix")]
    pub bot_prefix: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            short_circuit: ShortCircuitPolicy::default(),
            bot_prefix: default_bot_prefix(),
        }
    }
}

fn default_bot_prefix() -> String {
    "bot:".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.memory.backend, MemoryBackend::Lance);
        assert_eq!(config.memory.max_messages, 5);
        assert_eq!(config.memory.store_timeout_secs, 10);
        assert_eq!(config.index.table, "chunks");
        assert_eq!(config.index.dimension, 384);
        assert_eq!(config.index.top_k, 3);
        assert_eq!(config.embedding.model, "all-minilm-l6-v2");
        assert_eq!(config.generation.api_url, "https://api.openai.com/v1");
        assert_eq!(config.generation.api_key_env, "OPENAI_API_KEY");
        assert!((config.generation.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.generation.seed, 42);
        assert_eq!(config.generation.max_retries, 0);
        assert_eq!(config.orchestrator.short_circuit, ShortCircuitPolicy::Disabled);
        assert_eq!(config.orchestrator.bot_prefix, "bot:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/mise"

[memory]
backend = "in_memory"
max_messages = 8
store_timeout_secs = 3

[index]
table = "recipes"
dimension = 768
top_k = 5

[embedding]
model = "bge-small-en-v1.5"
batch_size = 16

[generation]
api_url = "http://localhost:11434/v1"
api_key_env = "LOCAL_KEY"
model = "llama3"
timeout_secs = 20
temperature = 0.0
seed = 7
max_retries = 2

[orchestrator]
short_circuit = "direct_answer"
bot_prefix = "assistant:"
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/mise"));
        assert_eq!(config.memory.backend, MemoryBackend::InMemory);
        assert_eq!(config.memory.max_messages, 8);
        assert_eq!(config.memory.store_timeout_secs, 3);
        assert_eq!(config.index.table, "recipes");
        assert_eq!(config.index.dimension, 768);
        assert_eq!(config.index.top_k, 5);
        assert_eq!(config.embedding.model, "bge-small-en-v1.5");
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(config.generation.api_url, "http://localhost:11434/v1");
        assert_eq!(config.generation.api_key_env, "LOCAL_KEY");
        assert_eq!(config.generation.model, "llama3");
        assert_eq!(config.generation.timeout_secs, 20);
        assert_eq!(config.generation.temperature, 0.0);
        assert_eq!(config.generation.seed, 7);
        assert_eq!(config.generation.max_retries, 2);
        assert_eq!(
            config.orchestrator.short_circuit,
            ShortCircuitPolicy::DirectAnswer
        );
        assert_eq!(config.orchestrator.bot_prefix, "assistant:");
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[generation]
model = "gpt-4o"
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.generation.model, "gpt-4o");
        assert_eq!(config.generation.seed, 42);
        assert_eq!(config.memory.max_messages, 5);
        assert_eq!(config.index.top_k, 3);
    }

    #[test]
    fn test_unknown_short_circuit_policy_rejected() {
        let toml_str = r#"
[orchestrator]
short_circuit = "sometimes"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.generation.api_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(MiseError::Config(_))));

        let mut config = Config::default();
        config.memory.max_messages = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generation.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/var/lib/mise");
            std::env::set_var(API_URL_ENV, "http://127.0.0.1:8080/v1");
        }

        let mut config = Config::default();
        config.apply_env_overrides();

        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
            std::env::remove_var(API_URL_ENV);
        }

        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/mise"));
        assert_eq!(config.generation.api_url, "http://127.0.0.1:8080/v1");
    }
}
