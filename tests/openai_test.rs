// tests/openai_test.rs — Integration test: session against a local OpenAI-compatible server

use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley::core::cost::PricingTable;
use parley::core::dispatcher::ModelDispatcher;
use parley::core::ledger::UsageLedger;
use parley::core::normalize::TextNormalizer;
use parley::core::orchestrator::{SessionOrchestrator, SessionSettings};
use parley::core::transcript::ChatLog;
use parley::core::types::{ModelConfig, ModelKind, TurnOutcome};
use parley::infra::errors::ParleyError;
use parley::provider::openai::OpenAIProvider;

fn session(dir: &TempDir, base_url: String) -> SessionOrchestrator {
    let pricing = PricingTable::builtin();
    let provider = Arc::new(OpenAIProvider::with_base_url("sk-test".into(), base_url));
    SessionOrchestrator::new(
        ModelDispatcher::remote(provider, ModelConfig::for_kind(ModelKind::Gpt4o, &pricing)),
        UsageLedger::new(dir.path().join("usage.json"), pricing),
        ChatLog::new(dir.path().join("chat_log.txt")),
        TextNormalizer::new(30, "  "),
        SessionSettings::default(),
    )
}

#[tokio::test]
async fn test_remote_turn_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{ "role": "user", "content": "Area of a triangle?" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": r"\[ A = \frac{1}{2} b h \]"
                }
            }],
            "usage": { "prompt_tokens": 400000, "completion_tokens": 100000 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut orch = session(&dir, server.uri());
    let reply = match orch.turn("Area of a triangle?").await {
        TurnOutcome::Reply(r) => r,
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(reply.clean, "A = 1 / 2 b h");
    // 0.4M * 2.50 + 0.1M * 10.00
    let cost = reply.cost.unwrap();
    assert!((cost.turn_cost - 2.0).abs() < 1e-9);
    assert!((cost.percent_of_cap() - 40.0).abs() < 1e-9);

    let usage: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("usage.json")).unwrap())
            .unwrap();
    assert_eq!(usage["input"], 400000);
    assert_eq!(usage["output"], 100000);
}

#[tokio::test]
async fn test_api_error_is_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut orch = session(&dir, server.uri());

    match orch.turn("hello").await {
        TurnOutcome::Failed(ParleyError::Api { message, .. }) => {
            assert!(message.contains("quota exceeded"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(orch.state().running());
    assert!(!dir.path().join("usage.json").exists());
    // Nothing logged for a failed turn
    assert!(!dir.path().join("chat_log.txt").exists());
}
