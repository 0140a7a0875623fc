//! Model providers against local stubs of the OpenAI and Anthropic APIs.

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use sleuth_core::brain::LlmProvider;
use sleuth_core::config::{LlmConfig, RetryConfig};
use sleuth_core::error::LlmError;
use sleuth_core::providers::{AnthropicProvider, OpenAiCompatibleProvider, RetryingProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

fn config(provider: &str, base_url: String) -> LlmConfig {
    LlmConfig {
        provider: provider.into(),
        model: "stub-model".into(),
        base_url: Some(base_url),
        request_timeout_secs: 5,
        ..LlmConfig::default()
    }
}

#[tokio::test]
async fn test_openai_round_trip() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            assert_eq!(headers["authorization"], "Bearer sk-test");
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
            Json(json!({
                "choices": [{"message": {"role": "assistant", "content": format!("echo: {prompt}")}}]
            }))
        }),
    );
    let base = spawn_stub(app).await;
    let provider =
        OpenAiCompatibleProvider::new_with_key(&config("openai", base), "sk-test".into()).unwrap();

    assert_eq!(provider.run("hello").await.unwrap(), "echo: hello");
}

#[tokio::test]
async fn test_openai_unauthorized() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::UNAUTHORIZED, "{}").into_response() }),
    );
    let base = spawn_stub(app).await;
    let provider =
        OpenAiCompatibleProvider::new_with_key(&config("openai", base), "bad".into()).unwrap();

    assert!(matches!(
        provider.run("hello").await,
        Err(LlmError::AuthFailed { .. })
    ));
}

#[tokio::test]
async fn test_anthropic_round_trip() {
    let app = Router::new().route(
        "/v1/messages",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            assert_eq!(headers["x-api-key"], "ak-test");
            assert_eq!(headers["anthropic-version"], "2023-06-01");
            assert!(body["max_tokens"].as_u64().is_some());
            Json(json!({
                "model": "stub-model",
                "content": [{"type": "text", "text": "Hello from Claude"}],
                "stop_reason": "end_turn"
            }))
        }),
    );
    let base = spawn_stub(app).await;
    let provider =
        AnthropicProvider::new_with_key(&config("anthropic", base), "ak-test".into()).unwrap();

    assert_eq!(provider.run("hi").await.unwrap(), "Hello from Claude");
}

#[tokio::test]
async fn test_retrying_provider_gives_up_on_persistent_outage() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::BAD_GATEWAY, "upstream down").into_response()
            }
        }),
    );
    let base = spawn_stub(app).await;
    let inner = OpenAiCompatibleProvider::new_with_key(&config("openai", base), "k".into()).unwrap();
    let provider = RetryingProvider::new(
        Arc::new(inner),
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            jitter: false,
        },
    );

    match provider.run("hello").await {
        Err(LlmError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, LlmError::Connection { .. }));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
