//! # Sleuth Core
//!
//! Core library for the Sleuth research assistant.
//! Provides the research pipeline, the language model and web search
//! collaborators, the WebSocket gateway, configuration, and error types.

pub mod brain;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod providers;
pub mod search;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use chat::{ChatAssistant, is_exit_command};
pub use config::{LlmConfig, PipelineConfig, RetryConfig, SearchConfig, SleuthConfig, load_config};
pub use error::{ConfigError, LlmError, PipelineError, Result, SearchError, SleuthError};
pub use gateway::{GatewayConfig, GatewayServer, SharedGateway};
pub use pipeline::{EventSink, FinalReport, ResearchEvent, ResearchPipeline, Stage};
pub use providers::create_provider;
pub use search::{NO_RESULTS, SearchBackend, SearchHit, WebSearch};
