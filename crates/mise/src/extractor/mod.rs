//! Signal extraction
//!
//! Turns one raw utterance into structured signal with a single JSON-mode
//! model call. Two entry points exist: `categorize` also decides whether the
//! utterance is a recipe request and may answer it directly, `extract_facts`
//! only pulls out user facts.

pub mod prompts;
pub mod types;

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::generation::{CompletionRequest, GenerationClient, GenerationParams};

pub use prompts::{CATEGORIZE_PROMPT, EXTRACTION_SYSTEM_PROMPT, FACTS_PROMPT};
pub use types::{Category, CategorizationResult, parse_categorization, parse_facts};

pub struct SignalExtractor {
    client: Arc<dyn GenerationClient>,
    params: GenerationParams,
}

impl SignalExtractor {
    pub fn new(client: Arc<dyn GenerationClient>, params: GenerationParams) -> Self {
        Self { client, params }
    }

    async fn call(&self, template: &str, utterance: &str) -> Result<String> {
        let request = CompletionRequest::new(
            EXTRACTION_SYSTEM_PROMPT,
            template.replace("{query}", utterance),
            self.params,
        )
        .json();

        let response = self.client.complete(&request).await?;
        debug!("Extraction response: {}", response);
        Ok(response)
    }

    /// Category, user facts, and a direct answer for non-task utterances
    ///
    /// Unparseable output fails with `MalformedModelOutput`; it is not retried.
    pub async fn categorize(&self, utterance: &str) -> Result<CategorizationResult> {
        let response = self.call(CATEGORIZE_PROMPT, utterance).await?;
        let result = parse_categorization(&response)?;
        debug!(
            category = ?result.category,
            facts = result.relevant_info.len(),
            direct_answer = result.direct_answer.is_some(),
            "Categorized utterance"
        );
        Ok(result)
    }

    /// User facts only
    pub async fn extract_facts(&self, utterance: &str) -> Result<Vec<String>> {
        let response = self.call(FACTS_PROMPT, utterance).await?;
        let facts = parse_facts(&response)?;
        debug!(facts = facts.len(), "Extracted user facts");
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MiseError;
    use crate::generation::ResponseFormat;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed string and keeps the last request
    struct CannedClient {
        reply: String,
        last: Mutex<Option<CompletionRequest>>,
    }

    impl CannedClient {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl GenerationClient for CannedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &'static str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_categorize_builds_json_request() {
        let client = CannedClient::new(
            r#"{"category": "other", "relevant_info": ["dislikes mushrooms"], "answer": "Noted!"}"#,
        );
        let extractor = SignalExtractor::new(client.clone(), GenerationParams::default());

        let result = extractor
            .categorize("I don't like mushrooms.")
            .await
            .unwrap();
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.direct_answer.as_deref(), Some("Noted!"));

        let request = client.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.response_format, ResponseFormat::JsonObject);
        assert_eq!(request.system_prompt, EXTRACTION_SYSTEM_PROMPT);
        assert!(request.user_prompt.ends_with("Query: I don't like mushrooms."));
        assert_eq!(request.seed, 42);
    }

    #[tokio::test]
    async fn test_extract_facts() {
        let client = CannedClient::new(
            r#"{"relevant_info": ["likes vegetarian food", "dislikes mushrooms"]}"#,
        );
        let extractor = SignalExtractor::new(client.clone(), GenerationParams::default());

        let facts = extractor
            .extract_facts("I am vegetarian and I don't like mushrooms.")
            .await
            .unwrap();
        assert_eq!(facts, vec!["likes vegetarian food", "dislikes mushrooms"]);

        let request = client.last.lock().unwrap().clone().unwrap();
        assert!(request.user_prompt.starts_with("Capture any relevant info"));
    }

    #[tokio::test]
    async fn test_malformed_output_propagates() {
        let client = CannedClient::new("I think they like pasta");
        let extractor = SignalExtractor::new(client, GenerationParams::default());

        let result = extractor.categorize("pasta?").await;
        assert!(matches!(result, Err(MiseError::MalformedModelOutput(_))));
    }
}
