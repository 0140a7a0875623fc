//! Research pipeline: five sequential stages over a single query.
//!
//! 1. **Intent analysis**: the model labels topic, keywords, time range, location, domain, purpose
//! 2. **Web search**: the raw query goes to the search collaborator
//! 3. **Classification**: the model buckets the search results into fixed categories
//! 4. **Deep analysis**: the model runs a fixed analytic template
//! 5. **Insights**: the model derives findings, trends, recommendations, risks, outlook
//!
//! Progress is streamed through an [`EventSink`] as the stages complete.

pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod stage;

pub use events::{EventSink, FinalReport, ResearchEvent};
pub use orchestrator::{ResearchPipeline, ResearchPipelineBuilder, report_tool_unavailable};
pub use stage::Stage;
