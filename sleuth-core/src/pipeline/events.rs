//! Outbound research events and where they go.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PipelineError;

/// The aggregate delivered with `final_result`.
///
/// Search results are not repeated here; they were already streamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub intent_analysis: String,
    pub classification: String,
    pub analysis: String,
    pub insights: String,
}

/// A progress or result message for one client, serialized as `{type, content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ResearchEvent {
    Status(String),
    Step(String),
    IntentAnalysis(String),
    SearchResults(String),
    Classification(String),
    FinalResult(FinalReport),
    Error(String),
}

impl ResearchEvent {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ResearchEvent::Status(_) => "status",
            ResearchEvent::Step(_) => "step",
            ResearchEvent::IntentAnalysis(_) => "intent_analysis",
            ResearchEvent::SearchResults(_) => "search_results",
            ResearchEvent::Classification(_) => "classification",
            ResearchEvent::FinalResult(_) => "final_result",
            ResearchEvent::Error(_) => "error",
        }
    }

    /// Whether no further events follow for the same query.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchEvent::FinalResult(_) | ResearchEvent::Error(_))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Destination for the events of one research run.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event, or fail with `TransportClosed` if the client is gone.
    async fn emit(&self, event: ResearchEvent) -> Result<(), PipelineError>;
}

#[async_trait]
impl EventSink for mpsc::Sender<ResearchEvent> {
    async fn emit(&self, event: ResearchEvent) -> Result<(), PipelineError> {
        self.send(event)
            .await
            .map_err(|_| PipelineError::TransportClosed)
    }
}
