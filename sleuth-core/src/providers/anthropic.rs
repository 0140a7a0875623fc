//! Anthropic Messages API provider implementation.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - `max_tokens` is mandatory
//! - The reply is an array of typed content blocks

use super::{http_client, map_send_error};
use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// The default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: Option<f32>,
    timeout_secs: u64,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    /// Concatenate the text blocks of a Messages API response.
    fn parse_response(body: &Value) -> Result<String, LlmError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;

        let mut text = String::new();
        for block in blocks {
            match block["type"].as_str().unwrap_or("text") {
                "text" => text.push_str(block["text"].as_str().unwrap_or("")),
                other => warn!(block_type = other, "Ignoring non-text content block"),
            }
        }
        Ok(text)
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            // 529 is Anthropic's "overloaded"
            code if code >= 500 => LlmError::Connection {
                message: format!("HTTP {} from Anthropic API: {}", status, body_text),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Anthropic API: {}", status, body_text),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn run(&self, prompt: &str) -> Result<String, LlmError> {
        let body = self.build_request_body(prompt);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = self.model.as_str(),
            url = url.as_str(),
            "Sending Anthropic completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs, "Anthropic API"))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs, "Anthropic API"))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "SLEUTH_TEST_ANTHROPIC_KEY_UNUSED".to_string(),
            max_tokens: 2048,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_build_request_body() {
        let provider = AnthropicProvider::new_with_key(&test_config(), "k".into()).unwrap();
        let body = provider.build_request_body("Summarise this");
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["content"], "Summarise this");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let body = json!({
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "Part one. "},
                {"type": "thinking", "thinking": "hidden"},
                {"type": "text", "text": "Part two."}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(
            AnthropicProvider::parse_response(&body).unwrap(),
            "Part one. Part two."
        );
    }

    #[test]
    fn test_parse_response_missing_content() {
        let body = json!({"model": "x"});
        assert!(matches!(
            AnthropicProvider::parse_response(&body),
            Err(LlmError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_map_http_error_codes() {
        assert!(matches!(
            AnthropicProvider::map_http_error(reqwest::StatusCode::UNAUTHORIZED, ""),
            LlmError::AuthFailed { .. }
        ));
        match AnthropicProvider::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "{}") {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 30),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
        assert!(matches!(
            AnthropicProvider::map_http_error(reqwest::StatusCode::BAD_GATEWAY, ""),
            LlmError::Connection { .. }
        ));
        assert!(matches!(
            AnthropicProvider::map_http_error(reqwest::StatusCode::BAD_REQUEST, "bad"),
            LlmError::ApiRequest { .. }
        ));
    }
}
