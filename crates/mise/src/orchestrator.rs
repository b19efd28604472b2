//! Conversational turn pipeline
//!
//! `gen_answer` runs one turn as a linear chain of awaited steps:
//!
//! 1. record the user message
//! 2. extract signal from it
//! 3. append extracted facts
//! 4. (policy dependent) answer directly and stop
//! 5. re-read the memory snapshot
//! 6. retrieve grounding propositions
//! 7. build the grounded prompt
//! 8. generate the answer
//! 9. record the answer as a bot message
//!
//! Writes that completed before a failing step stay committed. Turns for the
//! same user are serialized; turns for different users run concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::config::{OrchestratorConfig, ShortCircuitPolicy};
use crate::error::{MiseError, Result};
use crate::extractor::{Category, SignalExtractor};
use crate::generation::{CompletionRequest, GenerationClient, GenerationParams};
use crate::memory::MemoryStore;
use crate::prompt::{ANSWER_SYSTEM_PROMPT, build_prompt};
use crate::retrieval::Retriever;

pub struct Orchestrator {
    memory: Arc<dyn MemoryStore>,
    extractor: SignalExtractor,
    retriever: Retriever,
    generator: Arc<dyn GenerationClient>,
    params: GenerationParams,
    config: OrchestratorConfig,
    store_timeout: Duration,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        memory: Arc<dyn MemoryStore>,
        extractor: SignalExtractor,
        retriever: Retriever,
        generator: Arc<dyn GenerationClient>,
        params: GenerationParams,
        config: OrchestratorConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            memory,
            extractor,
            retriever: retriever.with_search_timeout(store_timeout),
            generator,
            params,
            config,
            store_timeout,
            user_locks: DashMap::new(),
        }
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn store_call<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| {
                MiseError::StoreUnavailable(format!(
                    "{op} timed out after {:?}",
                    self.store_timeout
                ))
            })?
    }

    async fn record_bot(&self, user_id: &str, answer: &str) -> Result<()> {
        let entry = format!("{}{}", self.config.bot_prefix, answer);
        self.store_call(
            "append_chat_message",
            self.memory.append_chat_message(user_id, &entry),
        )
        .await
    }

    /// Answer one user utterance, keeping the user's memory current
    pub async fn gen_answer(&self, user_id: &str, utterance: &str) -> Result<String> {
        let turn_id = Uuid::new_v4();
        let span = info_span!("turn", user_id, %turn_id);

        async {
            let lock = self.user_lock(user_id);
            let result = {
                let _turn = lock.lock().await;
                self.run_turn(user_id, utterance).await
            };
            drop(lock);
            self.user_locks
                .remove_if(user_id, |_, idle| Arc::strong_count(idle) == 1);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_turn(&self, user_id: &str, utterance: &str) -> Result<String> {
        self.store_call(
            "append_chat_message",
            self.memory.append_chat_message(user_id, utterance),
        )
        .await?;

        let (facts, direct_answer) = match self.config.short_circuit {
            ShortCircuitPolicy::Disabled => {
                (self.extractor.extract_facts(utterance).await?, None)
            }
            ShortCircuitPolicy::DirectAnswer => {
                let result = self.extractor.categorize(utterance).await?;
                let direct = match result.category {
                    Category::Other => result.direct_answer,
                    Category::PrimaryTask => None,
                };
                (result.relevant_info, direct)
            }
        };

        if !facts.is_empty() {
            self.store_call(
                "append_relevant_info",
                self.memory.append_relevant_info(user_id, &facts),
            )
            .await?;
            debug!(count = facts.len(), "Recorded user facts");
        }

        if let Some(answer) = direct_answer {
            self.record_bot(user_id, &answer).await?;
            info!("Answered directly without retrieval");
            return Ok(answer);
        }

        let snapshot = self
            .store_call("fetch", self.memory.fetch(user_id))
            .await?;

        let context = self
            .retriever
            .retrieve(utterance, &snapshot.relevant_info)
            .await?;

        let prompt = build_prompt(
            utterance,
            &context,
            &snapshot.recent_chat_history,
            &snapshot.relevant_info,
        );
        let request = CompletionRequest::new(ANSWER_SYSTEM_PROMPT, prompt, self.params);
        let answer = self.generator.complete(&request).await?;

        self.record_bot(user_id, &answer).await?;
        info!(answer_len = answer.len(), "Turn complete");
        Ok(answer)
    }
}
