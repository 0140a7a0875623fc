//! # Web Search Collaborator
//!
//! A [`SearchBackend`] fetches raw hits from an upstream search API.
//! [`WebSearch`] wraps a backend with the retry policy and turns every outcome
//! into text: rendered hits, the [`NO_RESULTS`] sentinel, or a rendered fault.
//! From the pipeline's point of view a search never fails.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{RetryConfig, SearchConfig, env_credential};
use crate::error::SearchError;
use crate::providers::with_retry;

/// Returned in place of results when the upstream API found nothing.
pub const NO_RESULTS: &str = "No relevant results found";

/// One upstream search result, in upstream rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A source of raw web search hits.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Google Custom Search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    snippet: Option<String>,
}

/// Google Custom Search JSON API backend.
pub struct GoogleSearchBackend {
    client: Client,
    config: SearchConfig,
    api_key: String,
    cx: String,
}

impl GoogleSearchBackend {
    /// Create a backend, reading the key and engine id from the environment.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = env_credential(&config.api_key_env).map_err(|_| SearchError::NotConfigured {
            missing: config.api_key_env.clone(),
        })?;
        let cx = env_credential(&config.cx_env).map_err(|_| SearchError::NotConfigured {
            missing: config.cx_env.clone(),
        })?;
        Self::new(config.clone(), api_key, cx)
    }

    /// Create a backend with explicitly provided credentials.
    pub fn new(config: SearchConfig, api_key: String, cx: String) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SearchError::Request {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            config,
            api_key,
            cx,
        })
    }

    fn query_params(&self, query: &str) -> Vec<(&'static str, String)> {
        vec![
            ("key", self.api_key.clone()),
            ("cx", self.cx.clone()),
            ("q", query.to_string()),
            ("num", self.config.num_results.to_string()),
            ("start", self.config.start.to_string()),
            ("safe", self.config.safe.clone()),
            ("fields", self.config.fields.clone()),
            ("hl", self.config.language.clone()),
            ("gl", self.config.country.clone()),
        ]
    }

    /// Parse a Custom Search response body. A missing `items` array means zero hits.
    pub fn parse_response(body: &str) -> Result<Vec<SearchHit>, SearchError> {
        let parsed: GoogleResponse =
            serde_json::from_str(body).map_err(|e| SearchError::ResponseParse {
                message: e.to_string(),
            })?;
        Ok(parsed
            .items
            .into_iter()
            .map(|item| SearchHit {
                title: item.title,
                link: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for GoogleSearchBackend {
    async fn fetch(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        debug!(url = %self.config.base_url, query_len = query.len(), "Sending search request");

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&self.query_params(query))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        timeout_secs: self.config.request_timeout_secs,
                    }
                } else {
                    SearchError::Request {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SearchError::Request {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Self::parse_response(&body)
    }

    fn name(&self) -> &str {
        "google"
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Render hits as `Title / Link / Snippet` blocks separated by a blank line.
pub fn render_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "Title: {}\nLink: {}\nSnippet: {}",
                hit.title,
                hit.link,
                hit.snippet.as_deref().unwrap_or("No snippet")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The search capability handed to the pipeline and the chat front end.
#[derive(Clone)]
pub struct WebSearch {
    backend: Arc<dyn SearchBackend>,
    retry: RetryConfig,
}

impl WebSearch {
    pub fn new(backend: Arc<dyn SearchBackend>, retry: RetryConfig) -> Self {
        Self { backend, retry }
    }

    /// Build the configured search capability.
    ///
    /// Fails with `NotConfigured` when search is disabled or a credential is missing.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        if !config.enabled {
            return Err(SearchError::NotConfigured {
                missing: "search.enabled".to_string(),
            });
        }
        let backend = GoogleSearchBackend::from_config(config)?;
        Ok(Self::new(Arc::new(backend), config.retry.clone()))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Search for `query` and render the outcome as text. Never fails.
    pub async fn search(&self, query: &str) -> String {
        match with_retry(&self.retry, || self.backend.fetch(query)).await {
            Ok(hits) if hits.is_empty() => NO_RESULTS.to_string(),
            Ok(hits) => {
                debug!(hits = hits.len(), backend = self.backend.name(), "Search complete");
                render_hits(&hits)
            }
            Err(e) => {
                warn!(error = %e, backend = self.backend.name(), "Search failed");
                format!("Search failed: {}", e)
            }
        }
    }
}

impl std::fmt::Debug for WebSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearch")
            .field("backend", &self.backend.name())
            .field("retry", &self.retry)
            .finish()
    }
}

/// A scripted backend for tests and offline runs.
pub struct StaticSearchBackend {
    outcome: Result<Vec<SearchHit>, SearchError>,
    calls: std::sync::atomic::AtomicUsize,
}

impl StaticSearchBackend {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            outcome: Ok(hits),
            calls: Default::default(),
        }
    }

    pub fn failing(error: SearchError) -> Self {
        Self {
            outcome: Err(error),
            calls: Default::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for StaticSearchBackend {
    async fn fetch(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        "static"
    }
}
