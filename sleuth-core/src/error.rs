//! Error types for the Sleuth core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the model collaborator, the search collaborator, the research
//! pipeline, and configuration.

use std::path::PathBuf;

/// Top-level error type for the Sleuth core library.
#[derive(Debug, thiserror::Error)]
pub enum SleuthError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from language model provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

/// Errors from the web search backend.
///
/// These never abort a research run: the search adapter renders them as
/// text and the pipeline carries on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search is not configured: {missing}")]
    NotConfigured { missing: String },

    #[error("Search request failed: {message}")]
    Request { message: String },

    #[error("Search API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Search response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Search request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SearchError> },
}

/// Errors that end a research pipeline run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("System error: the web search tool is not available")]
    ToolUnavailable,

    #[error("Research failed during {stage}: {source}")]
    Collaborator {
        stage: &'static str,
        #[source]
        source: LlmError,
    },

    #[error("Research failed: {stage} timed out after {timeout_secs}s")]
    StageTimeout {
        stage: &'static str,
        timeout_secs: u64,
    },

    #[error("Client connection closed")]
    TransportClosed,

    #[error("Research run was cancelled")]
    Cancelled,

    #[error("A research run is already in progress for this session")]
    Busy,

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl PipelineError {
    /// Whether the client can still be told about this failure.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, PipelineError::TransportClosed | PipelineError::Cancelled)
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `SleuthError`.
pub type Result<T> = std::result::Result<T, SleuthError>;
