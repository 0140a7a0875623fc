//! Research orchestrator: drives one query through the five stages.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::events::{EventSink, FinalReport, ResearchEvent};
use super::prompts;
use super::stage::Stage;
use crate::brain::LlmProvider;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, SearchError};
use crate::search::WebSearch;

/// Status text of the first event of every run.
pub const STARTED_MESSAGE: &str = "Research pipeline started";

/// Builder for [`ResearchPipeline`].
pub struct ResearchPipelineBuilder {
    llm: Arc<dyn LlmProvider>,
    search: Option<WebSearch>,
    config: PipelineConfig,
}

impl ResearchPipelineBuilder {
    /// Register the web search capability. Required.
    pub fn search(mut self, search: WebSearch) -> Self {
        self.search = Some(search);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails with `ToolUnavailable` when no search capability was supplied.
    pub fn build(self) -> Result<ResearchPipeline, PipelineError> {
        let search = self.search.ok_or(PipelineError::ToolUnavailable)?;
        Ok(ResearchPipeline {
            llm: self.llm,
            search,
            permits: Arc::new(Semaphore::new(self.config.max_concurrent_calls)),
            stage_timeout: Duration::from_secs(self.config.stage_timeout_secs),
        })
    }
}

/// The five-stage research pipeline.
///
/// One instance is shared by every session. The collaborators are stateless
/// and the semaphore bounds collaborator calls in flight across all runs.
pub struct ResearchPipeline {
    llm: Arc<dyn LlmProvider>,
    search: WebSearch,
    permits: Arc<Semaphore>,
    stage_timeout: Duration,
}

impl ResearchPipeline {
    pub fn builder(llm: Arc<dyn LlmProvider>) -> ResearchPipelineBuilder {
        ResearchPipelineBuilder {
            llm,
            search: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Run the pipeline for `query`, streaming progress to `sink`.
    ///
    /// On success the emitted kinds are: status, step, intent_analysis, step,
    /// search_results, step, classification, step, step, final_result.
    /// On failure exactly one `error` event is emitted, unless the transport is
    /// gone or the run was cancelled, in which case nothing more is sent.
    pub async fn run(
        &self,
        query: &str,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<FinalReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("research_run", %run_id, query_len = query.len());

        async move {
            info!("Research run started");
            match self.execute(query, sink, cancel).await {
                Ok(report) => {
                    info!("Research completed successfully");
                    Ok(report)
                }
                Err(e) if e.is_reportable() => {
                    error!(error = %e, "Research failed");
                    if let Err(send_err) = sink.emit(ResearchEvent::Error(e.to_string())).await {
                        warn!(error = %send_err, "Could not deliver error event");
                    }
                    Err(e)
                }
                Err(e) => {
                    info!(reason = %e, "Research abandoned");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        query: &str,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<FinalReport, PipelineError> {
        self.emit(sink, cancel, ResearchEvent::Status(STARTED_MESSAGE.into()))
            .await?;

        self.begin(sink, cancel, Stage::IntentAnalysis).await?;
        let intent_analysis = self
            .ask(Stage::IntentAnalysis, prompts::intent_prompt(query), cancel)
            .await?;
        self.emit(
            sink,
            cancel,
            ResearchEvent::IntentAnalysis(intent_analysis.clone()),
        )
        .await?;

        self.begin(sink, cancel, Stage::WebSearch).await?;
        let search_results = self.web_search(query, cancel).await?;
        self.emit(
            sink,
            cancel,
            ResearchEvent::SearchResults(search_results.clone()),
        )
        .await?;

        self.begin(sink, cancel, Stage::Classification).await?;
        let classification = self
            .ask(
                Stage::Classification,
                prompts::classification_prompt(&search_results),
                cancel,
            )
            .await?;
        self.emit(
            sink,
            cancel,
            ResearchEvent::Classification(classification.clone()),
        )
        .await?;

        self.begin(sink, cancel, Stage::DeepAnalysis).await?;
        let analysis = self
            .ask(Stage::DeepAnalysis, prompts::analysis_prompt(), cancel)
            .await?;

        self.begin(sink, cancel, Stage::Insights).await?;
        let insights = self
            .ask(Stage::Insights, prompts::insights_prompt(), cancel)
            .await?;

        let report = FinalReport {
            intent_analysis,
            classification,
            analysis,
            insights,
        };
        self.emit(sink, cancel, ResearchEvent::FinalResult(report.clone()))
            .await?;
        Ok(report)
    }

    /// Emit the `step` event that opens a stage.
    async fn begin(
        &self,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
        stage: Stage,
    ) -> Result<(), PipelineError> {
        info!(stage = stage.label(), "Stage started");
        self.emit(sink, cancel, ResearchEvent::Step(stage.step_message().into()))
            .await
    }

    async fn emit(
        &self,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
        event: ResearchEvent,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        debug!(kind = event.kind(), "Sending update");
        sink.emit(event).await
    }

    /// Call the model for a stage.
    async fn ask(
        &self,
        stage: Stage,
        prompt: String,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let llm = self.llm.clone();
        self.bounded(stage, cancel, async move {
            llm.run(&prompt)
                .await
                .map_err(|source| PipelineError::Collaborator {
                    stage: stage.label(),
                    source,
                })
        })
        .instrument(info_span!("stage", stage = stage.label()))
        .await
    }

    /// Search never aborts the run: a stage timeout is rendered like any other search fault.
    async fn web_search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let outcome = self
            .bounded(Stage::WebSearch, cancel, async {
                Ok(self.search.search(query).await)
            })
            .instrument(info_span!("stage", stage = Stage::WebSearch.label()))
            .await;

        match outcome {
            Err(PipelineError::StageTimeout { timeout_secs, .. }) => {
                warn!(timeout_secs, "Web search timed out");
                Ok(format!(
                    "Search failed: {}",
                    SearchError::Timeout { timeout_secs }
                ))
            }
            other => other,
        }
    }

    /// Admit a collaborator call through the shared semaphore, then bound the
    /// call by the stage timeout. Both waits race against cancellation.
    async fn bounded<F>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<String, PipelineError>
    where
        F: Future<Output = Result<String, PipelineError>>,
    {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| PipelineError::Cancelled)?,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            outcome = tokio::time::timeout(self.stage_timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(PipelineError::StageTimeout {
                    stage: stage.label(),
                    timeout_secs: self.stage_timeout.as_secs(),
                }),
            },
        }
    }
}

/// Tell a client that research cannot run because search is unavailable.
pub async fn report_tool_unavailable(sink: &dyn EventSink) -> Result<(), PipelineError> {
    error!("Web search tool not available");
    sink.emit(ResearchEvent::Error(
        PipelineError::ToolUnavailable.to_string(),
    ))
    .await
}
