//! The five fixed research stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the research pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentAnalysis,
    WebSearch,
    Classification,
    DeepAnalysis,
    Insights,
}

impl Stage {
    /// Every stage, in the order the pipeline runs them.
    pub const ALL: [Stage; 5] = [
        Stage::IntentAnalysis,
        Stage::WebSearch,
        Stage::Classification,
        Stage::DeepAnalysis,
        Stage::Insights,
    ];

    /// Short lowercase name used in logs and error messages.
    pub fn label(self) -> &'static str {
        match self {
            Stage::IntentAnalysis => "intent analysis",
            Stage::WebSearch => "web search",
            Stage::Classification => "classification",
            Stage::DeepAnalysis => "deep analysis",
            Stage::Insights => "insights",
        }
    }

    /// Progress text sent in the `step` event when the stage begins.
    pub fn step_message(self) -> &'static str {
        match self {
            Stage::IntentAnalysis => "Analyzing query intent...",
            Stage::WebSearch => "Running web search...",
            Stage::Classification => "Classifying search results...",
            Stage::DeepAnalysis => "Performing deep analysis...",
            Stage::Insights => "Generating research insights...",
        }
    }

    /// Whether the stage calls the language model (every stage but web search).
    pub fn uses_model(self) -> bool {
        !matches!(self, Stage::WebSearch)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
