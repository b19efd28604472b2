//! Generative model access
//!
//! Defines the GenerationClient trait that abstracts the chat-completion
//! backend, plus the request shape shared by the extractor and the
//! orchestrator.

pub mod openai;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::Result;

pub use openai::OpenAiClient;

/// Sampling parameters sent with every request
///
/// Defaults are low temperature and a fixed seed so answers are
/// reproducible across runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            seed: 42,
        }
    }
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            seed: config.seed,
        }
    }
}

/// Expected shape of the completion text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// The model is constrained to emit a single JSON object
    JsonObject,
}

/// One system + user prompt exchange
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub seed: u64,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: params.temperature,
            seed: params.seed,
            response_format: ResponseFormat::Text,
        }
    }

    /// Ask for a JSON object response
    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::JsonObject;
        self
    }
}

/// Trait for chat-completion backends
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run one completion and return the primary choice's text
    ///
    /// Any transport, HTTP, or timeout failure is `MiseError::GenerationFailed`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
