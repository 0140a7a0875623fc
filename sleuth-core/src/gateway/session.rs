//! Gateway session lifecycle management.
//!
//! [`SessionManager`] keeps per-connection records for health reporting.
//! [`ResearchSession`] is the per-connection driver that turns inbound text
//! frames into pipeline runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::parse_request;
use crate::error::PipelineError;
use crate::pipeline::{
    EventSink, FinalReport, ResearchEvent, ResearchPipeline, report_tool_unavailable,
};

/// State of a gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connected, waiting for a query.
    Idle,
    /// A research run is in flight.
    Running,
    /// The connection has gone away.
    Closed,
}

/// Bookkeeping for one connection's session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub connection_id: Uuid,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Queries accepted for a run.
    pub queries_served: u64,
}

/// Manages gateway sessions.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<Uuid, SessionRecord>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session for a connection.
    pub fn create_session(&mut self, connection_id: Uuid) -> Uuid {
        let now = Utc::now();
        let session_id = Uuid::new_v4();
        self.sessions.insert(
            session_id,
            SessionRecord {
                session_id,
                connection_id,
                state: SessionState::Idle,
                created_at: now,
                updated_at: now,
                queries_served: 0,
            },
        );
        session_id
    }

    /// Record that a query was accepted and its run started.
    pub fn mark_running(&mut self, session_id: &Uuid) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(session) if session.state != SessionState::Closed => {
                session.state = SessionState::Running;
                session.queries_served += 1;
                session.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Record that the in-flight run ended.
    pub fn mark_idle(&mut self, session_id: &Uuid) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(session) if session.state == SessionState::Running => {
                session.state = SessionState::Idle;
                session.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Close a session.
    pub fn close_session(&mut self, session_id: &Uuid) -> bool {
        if let Some(session) = self.sessions.get_mut(session_id)
            && session.state != SessionState::Closed
        {
            session.state = SessionState::Closed;
            session.updated_at = Utc::now();
            return true;
        }
        false
    }

    pub fn get(&self, session_id: &Uuid) -> Option<&SessionRecord> {
        self.sessions.get(session_id)
    }

    /// Sessions that are still connected.
    pub fn open_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.state != SessionState::Closed)
            .count()
    }

    /// Sessions with a run in flight.
    pub fn running_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Running)
            .count()
    }

    /// Total sessions (all states).
    pub fn total_count(&self) -> usize {
        self.sessions.len()
    }

    /// Queries accepted across every session still on record.
    /// Remove closed sessions.
    pub fn cleanup_closed(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.state != SessionState::Closed);
        before - self.sessions.len()
    }
}

/// What became of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A pipeline run was started.
    Started,
    /// An `error` event was sent instead.
    Rejected,
}

/// Drives the research runs of one connection.
///
/// Owns the outbound event channel and a session-wide cancellation token.
/// Each run gets a child token, so closing (or dropping) the session cancels
/// whatever is in flight.
pub struct ResearchSession {
    pipeline: Option<Arc<ResearchPipeline>>,
    outbound: mpsc::Sender<ResearchEvent>,
    cancel: CancellationToken,
    in_flight: Option<JoinHandle<Result<FinalReport, PipelineError>>>,
}

impl ResearchSession {
    /// `pipeline` is `None` when the server has no search capability.
    pub fn new(
        pipeline: Option<Arc<ResearchPipeline>>,
        outbound: mpsc::Sender<ResearchEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            outbound,
            cancel,
            in_flight: None,
        }
    }

    /// Whether a run is still in flight.
    pub fn is_running(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed input, a second query while one is running, and a missing
    /// search capability each produce a single `error` event and leave the
    /// session open. Fails only when the client can no longer be reached.
    pub async fn handle_text(&mut self, text: &str) -> Result<Submission, PipelineError> {
        let request = match parse_request(text) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed message");
                self.outbound.emit(ResearchEvent::Error(e.to_string())).await?;
                return Ok(Submission::Rejected);
            }
        };

        if self.is_running() {
            debug!("Rejecting query while a run is in flight");
            self.outbound
                .emit(ResearchEvent::Error(PipelineError::Busy.to_string()))
                .await?;
            return Ok(Submission::Rejected);
        }

        let Some(pipeline) = self.pipeline.clone() else {
            report_tool_unavailable(&self.outbound).await?;
            return Ok(Submission::Rejected);
        };

        info!(query_len = request.query.len(), "Processing query");
        let sink = self.outbound.clone();
        let token = self.cancel.child_token();
        self.in_flight = Some(tokio::spawn(async move {
            pipeline.run(&request.query, &sink, &token).await
        }));
        Ok(Submission::Started)
    }

    /// Wait for the in-flight run to end. Returns `None` when nothing is running.
    ///
    /// Cancel-safe: dropping the future leaves the run in place.
    pub async fn join_run(&mut self) -> Option<Result<FinalReport, PipelineError>> {
        let handle = self.in_flight.as_mut()?;
        let outcome = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                warn!(error = %join_err, "Research task did not complete");
                Err(PipelineError::Cancelled)
            }
        };
        self.in_flight = None;
        Some(outcome)
    }

    /// Cancel any in-flight run.
    pub fn close(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for ResearchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
