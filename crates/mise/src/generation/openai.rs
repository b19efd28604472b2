//! OpenAI-compatible chat completion client
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol.
//! The API key is read from the environment variable named in config.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::{MiseError, Result};
use crate::generation::{CompletionRequest, GenerationClient, ResponseFormat};

#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    config: GenerationConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormatBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client from configuration
    ///
    /// Fails with `MiseError::Config` if the API key variable is unset.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            MiseError::Config(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MiseError::Config(format!("Failed to build HTTP client: {e}")))?;

        info!(
            "OpenAiClient initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    /// Fails fast unless `max_retries` is set, in which case 429 responses and
    /// transport errors are retried with exponential backoff from 1s.
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system_prompt,
                },
                Message {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            seed: request.seed,
            response_format: match request.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::JsonObject => Some(ResponseFormatBody {
                    kind: "json_object",
                }),
            },
        };

        let url = self.endpoint();
        debug!("Calling chat completions at: {}", url);

        let attempts = self.config.max_retries + 1;
        let mut delay = Duration::from_secs(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let retries_left = attempt + 1 < attempts;

            let response = match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = if e.is_timeout() {
                        format!("request timed out: {e}")
                    } else {
                        e.to_string()
                    };
                    if retries_left {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            attempts,
                            last_error
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    continue;
                }
            };

            let status = response.status();

            if status == 429 && retries_left {
                warn!(
                    "Rate limited on attempt {}/{}, waiting {:?}",
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(MiseError::GenerationFailed(format!(
                    "API returned {status}: {error_text}"
                )));
            }

            let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
                MiseError::GenerationFailed(format!("Invalid completion response: {e}"))
            })?;

            return completion
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| MiseError::GenerationFailed("Empty response".to_string()));
        }

        Err(MiseError::GenerationFailed(format!(
            "Failed after {attempts} attempt(s): {last_error}"
        )))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
