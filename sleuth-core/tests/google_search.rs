//! Google Custom Search backend against a local stub of the API.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use serde_json::json;
use sleuth_core::config::{RetryConfig, SearchConfig};
use sleuth_core::error::SearchError;
use sleuth_core::search::{GoogleSearchBackend, NO_RESULTS, SearchBackend, WebSearch};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serve `app` on an ephemeral port and return its base URL.
async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/customsearch/v1", addr)
}

fn backend(base_url: String) -> GoogleSearchBackend {
    let config = SearchConfig {
        base_url,
        request_timeout_secs: 5,
        ..SearchConfig::default()
    };
    GoogleSearchBackend::new(config, "test-key".into(), "test-cx".into()).unwrap()
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn test_sends_pinned_parameters() {
    let app = Router::new().route(
        "/customsearch/v1",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            // Echo the parameters back as a single hit.
            let mut keys: Vec<_> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            keys.sort();
            Json(json!({"items": [{"title": "echo", "link": "l", "snippet": keys.join("&")}]}))
        }),
    );
    let base = spawn_stub(app).await;

    let hits = backend(base).fetch("PUMA 台灣").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].snippet.as_deref().unwrap(),
        "cx=test-cx&fields=items(title,link,snippet)&gl=tw&hl=zh-TW&key=test-key&num=10&q=PUMA 台灣&safe=off&start=1"
    );
}

#[tokio::test]
async fn test_renders_hits_in_upstream_order() {
    let app = Router::new().route(
        "/customsearch/v1",
        get(|| async {
            Json(json!({"items": [
                {"title": "B first", "link": "https://b.example", "snippet": "two"},
                {"title": "A second", "link": "https://a.example"}
            ]}))
        }),
    );
    let base = spawn_stub(app).await;
    let search = WebSearch::new(Arc::new(backend(base)), fast_retry(0));

    assert_eq!(
        search.search("order").await,
        "Title: B first\nLink: https://b.example\nSnippet: two\n\n\
         Title: A second\nLink: https://a.example\nSnippet: No snippet"
    );
}

#[tokio::test]
async fn test_missing_items_is_no_results() {
    let app = Router::new().route("/customsearch/v1", get(|| async { Json(json!({})) }));
    let base = spawn_stub(app).await;
    let search = WebSearch::new(Arc::new(backend(base)), fast_retry(0));

    assert_eq!(search.search("").await, NO_RESULTS);
}

#[tokio::test]
async fn test_http_error_is_rendered() {
    let app = Router::new().route(
        "/customsearch/v1",
        get(|| async { (StatusCode::FORBIDDEN, "daily limit exceeded").into_response() }),
    );
    let base = spawn_stub(app).await;

    let err = backend(base.clone()).fetch("q").await.unwrap_err();
    assert!(matches!(err, SearchError::Status { status: 403, .. }));

    let search = WebSearch::new(Arc::new(backend(base)), fast_retry(2));
    assert_eq!(
        search.search("q").await,
        "Search failed: Search API returned HTTP 403: daily limit exceeded"
    );
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/customsearch/v1",
        get(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response()
                } else {
                    Json(json!({"items": [{"title": "ok", "link": "l", "snippet": "s"}]}))
                        .into_response()
                }
            }
        }),
    );
    let base = spawn_stub(app).await;
    let search = WebSearch::new(Arc::new(backend(base)), fast_retry(2));

    assert_eq!(search.search("q").await, "Title: ok\nLink: l\nSnippet: s");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_rendered() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let search = WebSearch::new(
        Arc::new(backend(format!("http://{}/customsearch/v1", addr))),
        fast_retry(0),
    );
    assert!(search.search("q").await.starts_with("Search failed: Search request failed: "));
}
