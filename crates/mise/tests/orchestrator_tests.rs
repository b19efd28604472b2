//! End-to-end turn tests
//!
//! Runs the full pipeline against a wiremock OpenAI-compatible endpoint,
//! a LanceDB chunk index, and the deterministic mock embedder.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use mise::MiseError;
use mise::config::{Config, ShortCircuitPolicy};
use mise::context::AppContext;
use mise::embedding::Embedder;
use mise::generation::{GenerationClient, OpenAiClient};
use mise::orchestrator::Orchestrator;
use mise::storage::IndexedChunk;
use mise::testing::MockEmbeddingModel;

const PROPOSITIONS: [(&str, &str); 5] = [
    ("1", "vegetarian food you can cook tonight: chickpea curry"),
    ("2", "easy vegetarian food to cook: lentil shepherd's pie"),
    ("3", "beef wellington wrapped in prosciutto"),
    ("4", "grilled salmon fillet"),
    ("5", "creamy mushroom risotto"),
];

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{
            "message": { "role": "assistant", "content": content }
        }]
    }))
}

fn extraction_call() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
}

fn answer_call() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("helping people pick recipes"))
}

struct Harness {
    ctx: AppContext,
    orchestrator: Orchestrator,
    _dir: TempDir,
}

async fn harness(
    server: &MockServer,
    key_env: &str,
    ephemeral: bool,
    policy: ShortCircuitPolicy,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    unsafe { std::env::set_var(key_env, "test-key") };

    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("data");
    config.generation.api_url = server.uri();
    config.generation.api_key_env = key_env.to_string();
    config.generation.timeout_secs = 5;
    config.orchestrator.short_circuit = policy;

    let ctx = AppContext::open(config, ephemeral).await.unwrap();

    let embedder = MockEmbeddingModel::new();
    let chunks: Vec<IndexedChunk> = PROPOSITIONS
        .iter()
        .map(|(id, text)| IndexedChunk {
            chunk_id: id.to_string(),
            raw_content: format!("Recipe {id}: {text}"),
            proposition: text.to_string(),
            embedding: embedder.embed(text).unwrap(),
        })
        .collect();
    let index = ctx.chunk_index().await.unwrap();
    index.load(&chunks).await.unwrap();

    let client: Arc<dyn GenerationClient> =
        Arc::new(OpenAiClient::new(&ctx.config().generation).unwrap());
    let orchestrator = ctx.orchestrator_with(client, Arc::new(embedder), Arc::new(index));
    ctx.memory().create_user("alice").await.unwrap();

    Harness {
        ctx,
        orchestrator,
        _dir: dir,
    }
}

async fn request_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

#[tokio::test]
async fn test_facts_from_first_turn_ground_second_turn() {
    let server = MockServer::start().await;

    extraction_call()
        .respond_with(completion(
            r#"{"relevant_info": ["likes vegetarian food", "dislikes mushrooms"]}"#,
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    extraction_call()
        .respond_with(completion(r#"{"relevant_info": []}"#))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    answer_call()
        .respond_with(completion("Noted, no mushrooms."))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    answer_call()
        .respond_with(completion("Make the chickpea curry."))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let h = harness(&server, "MISE_E2E_KEY_GROUNDING", true, ShortCircuitPolicy::Disabled).await;

    let first = h
        .orchestrator
        .gen_answer("alice", "I am vegetarian and I don't like mushrooms.")
        .await
        .unwrap();
    assert_eq!(first, "Noted, no mushrooms.");

    let memory = h.ctx.memory().fetch("alice").await.unwrap();
    assert_eq!(
        memory.relevant_info,
        vec!["likes vegetarian food", "dislikes mushrooms"]
    );

    let second = h
        .orchestrator
        .gen_answer("alice", "What should I cook tonight?")
        .await
        .unwrap();
    assert_eq!(second, "Make the chickpea curry.");

    let memory = h.ctx.memory().fetch("alice").await.unwrap();
    assert_eq!(
        memory.recent_chat_history,
        vec![
            "I am vegetarian and I don't like mushrooms.",
            "bot:Noted, no mushrooms.",
            "What should I cook tonight?",
            "bot:Make the chickpea curry.",
        ]
    );
    assert_eq!(memory.relevant_info.len(), 2);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 4);
    let second_answer = &bodies[3];
    assert!(second_answer.contains("likes vegetarian food"));
    assert!(second_answer.contains("dislikes mushrooms"));
    assert!(second_answer.contains("chickpea curry"));
    assert!(second_answer.contains("lentil shepherd's pie"));
    assert!(second_answer.contains("bot:Noted, no mushrooms."));
}

#[tokio::test]
async fn test_history_stays_bounded_across_turns() {
    let server = MockServer::start().await;

    extraction_call()
        .respond_with(completion(r#"{"relevant_info": []}"#))
        .mount(&server)
        .await;
    answer_call()
        .respond_with(completion("Here's an idea."))
        .mount(&server)
        .await;

    let h = harness(&server, "MISE_E2E_KEY_BOUNDED", false, ShortCircuitPolicy::Disabled).await;

    for i in 0..4 {
        h.orchestrator
            .gen_answer("alice", &format!("question {i}"))
            .await
            .unwrap();
    }

    let memory = h.ctx.memory().fetch("alice").await.unwrap();
    assert_eq!(
        memory.recent_chat_history,
        vec![
            "bot:Here's an idea.",
            "question 2",
            "bot:Here's an idea.",
            "question 3",
            "bot:Here's an idea.",
        ]
    );
}

#[tokio::test]
async fn test_malformed_extraction_fails_turn_after_recording_message() {
    let server = MockServer::start().await;

    extraction_call()
        .respond_with(completion("Sure! The user is vegetarian."))
        .mount(&server)
        .await;
    answer_call()
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, "MISE_E2E_KEY_MALFORMED", true, ShortCircuitPolicy::Disabled).await;

    let result = h.orchestrator.gen_answer("alice", "I'm vegetarian").await;
    assert!(matches!(result, Err(MiseError::MalformedModelOutput(_))));

    let memory = h.ctx.memory().fetch("alice").await.unwrap();
    assert_eq!(memory.recent_chat_history, vec!["I'm vegetarian"]);
    assert!(memory.relevant_info.is_empty());
}

#[tokio::test]
async fn test_direct_answer_skips_retrieval_and_generation() {
    let server = MockServer::start().await;

    extraction_call()
        .and(body_string_contains("primary_task"))
        .respond_with(completion(
            r#"{"category": "other", "relevant_info": [], "answer": "You're welcome!"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    answer_call()
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, "MISE_E2E_KEY_DIRECT", true, ShortCircuitPolicy::DirectAnswer).await;

    let answer = h.orchestrator.gen_answer("alice", "thanks!").await.unwrap();
    assert_eq!(answer, "You're welcome!");

    let memory = h.ctx.memory().fetch("alice").await.unwrap();
    assert_eq!(memory.recent_chat_history, vec!["thanks!", "bot:You're welcome!"]);
}

#[tokio::test]
async fn test_generation_error_is_reported() {
    let server = MockServer::start().await;

    extraction_call()
        .respond_with(completion(r#"{"relevant_info": ["allergic to peanuts"]}"#))
        .mount(&server)
        .await;
    answer_call()
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let h = harness(&server, "MISE_E2E_KEY_503", false, ShortCircuitPolicy::Disabled).await;

    let result = h.orchestrator.gen_answer("alice", "Satay? I'm allergic to peanuts").await;
    assert!(matches!(result, Err(MiseError::GenerationFailed(_))));

    let memory = h.ctx.memory().fetch("alice").await.unwrap();
    assert_eq!(memory.recent_chat_history, vec!["Satay? I'm allergic to peanuts"]);
    assert_eq!(memory.relevant_info, vec!["allergic to peanuts"]);
}

#[tokio::test]
async fn test_concurrent_turns_for_one_user_are_serialized() {
    let server = MockServer::start().await;

    extraction_call()
        .respond_with(completion(r#"{"relevant_info": []}"#))
        .mount(&server)
        .await;
    answer_call()
        .respond_with(completion("ok"))
        .mount(&server)
        .await;

    let h = harness(&server, "MISE_E2E_KEY_CONCURRENT", true, ShortCircuitPolicy::Disabled).await;
    let orchestrator = Arc::new(h.orchestrator);

    let a = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.gen_answer("alice", "first").await })
    };
    let b = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.gen_answer("alice", "second").await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // Each user message is directly followed by its own answer
    let history = h.ctx.memory().fetch("alice").await.unwrap().recent_chat_history;
    assert_eq!(history.len(), 4);
    assert!(!history[0].starts_with("bot:"));
    assert_eq!(history[1], "bot:ok");
    assert!(!history[2].starts_with("bot:"));
    assert_eq!(history[3], "bot:ok");
    assert_ne!(history[0], history[2]);
}
