//! Inbound message protocol.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The only accepted client message: `{"query": "<text>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResearchRequest {
    pub query: String,
}

/// Parse a text frame into a [`ResearchRequest`].
///
/// Only a JSON object is accepted. Serde would otherwise also take the
/// sequence form `["text"]` for a struct.
pub fn parse_request(text: &str) -> Result<ResearchRequest, PipelineError> {
    let invalid = |detail: String| PipelineError::InvalidRequest {
        reason: format!("expected {{\"query\": string}} ({})", detail),
    };

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
    if !value.is_object() {
        return Err(invalid(format!("got {}", json_kind(&value))));
    }
    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
