//! WebSocket gateway server built on axum.

use super::GatewayConfig;
use super::connection::ConnectionManager;
use super::session::{ResearchSession, SessionManager, Submission};
use crate::pipeline::{ResearchEvent, ResearchPipeline};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<Mutex<GatewayServer>>;

/// The WebSocket gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    pipeline: Option<Arc<ResearchPipeline>>,
    connections: ConnectionManager,
    sessions: SessionManager,
    queries_served: u64,
    started_at: chrono::DateTime<Utc>,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("config", &self.config)
            .field("search_available", &self.pipeline.is_some())
            .field("connections", &self.connections.active_count())
            .field("sessions", &self.sessions.total_count())
            .finish()
    }
}

impl GatewayServer {
    /// Create a gateway. Without a pipeline every query is answered with a
    /// ToolUnavailable error.
    pub fn new(config: GatewayConfig, pipeline: Option<Arc<ResearchPipeline>>) -> Self {
        let connections = ConnectionManager::new(config.max_connections);
        Self {
            config,
            pipeline,
            connections,
            sessions: SessionManager::new(),
            queries_served: 0,
            started_at: Utc::now(),
        }
    }

    /// Wrap the server for sharing across handlers.
    pub fn shared(self) -> SharedGateway {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn pipeline(&self) -> Option<Arc<ResearchPipeline>> {
        self.pipeline.clone()
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connections
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Mark a session's query as started. The served count never goes down,
    /// even after the session's record is cleaned up.
    pub fn record_query_started(&mut self, session_id: &Uuid) -> bool {
        let started = self.sessions.mark_running(session_id);
        if started {
            self.queries_served += 1;
        }
        started
    }

    /// Queries started since the server was created.
    pub fn queries_served(&self) -> u64 {
        self.queries_served
    }

    /// Uptime in seconds since the server was created.
    pub fn uptime_secs(&self) -> u64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_seconds().max(0) as u64
    }

    /// Snapshot served by `/health`.
    pub fn health(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "search_available": self.pipeline.is_some(),
            "model": self.pipeline.as_ref().map(|p| p.model_name().to_string()),
            "connections": self.connections.active_count(),
            "connections_rejected": self.connections.rejected_count(),
            "sessions_open": self.sessions.open_count(),
            "runs_in_flight": self.sessions.running_count(),
            "queries_served": self.queries_served,
            "uptime_secs": self.uptime_secs(),
        })
    }
}

/// Build an axum Router with `/ws` and `/health` routes.
///
/// When `static_dir` is given, unmatched paths are served from it with
/// `index.html` as the fallback page.
pub fn router(shared: SharedGateway, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(shared);

    match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            api.fallback_service(ServeDir::new(dir).not_found_service(ServeFile::new(index)))
        }
        None => api,
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(gw): State<SharedGateway>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, gw))
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let gw = gw.lock().await;
    axum::Json(gw.health())
}

fn event_frame(event: &ResearchEvent) -> Option<WsMessage> {
    match event.to_json() {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(e) => {
            warn!(error = %e, kind = event.kind(), "Failed to serialize event");
            None
        }
    }
}

/// Handle an individual WebSocket connection.
async fn handle_socket(mut socket: WebSocket, gw: SharedGateway) {
    let (conn_id, session_id, pipeline, buffer) = {
        let mut gw = gw.lock().await;
        match gw.connections_mut().admit() {
            Some(id) => {
                let session_id = gw.sessions_mut().create_session(id);
                (id, session_id, gw.pipeline(), gw.config().event_buffer.max(1))
            }
            None => {
                warn!("Rejecting connection: server at capacity");
                let err = ResearchEvent::Error("Server at maximum connections".to_string());
                if let Some(frame) = event_frame(&err) {
                    let _ = socket.send(frame).await;
                }
                let _ = socket.close().await;
                return;
            }
        }
    };

    let span = info_span!("session", %conn_id, %session_id);
    serve_session(socket, gw.clone(), conn_id, session_id, pipeline, buffer)
        .instrument(span)
        .await;

    let mut gw = gw.lock().await;
    gw.sessions_mut().close_session(&session_id);
    gw.sessions_mut().cleanup_closed();
    if let Some(info) = gw.connections_mut().release(&conn_id) {
        debug!(
            %conn_id,
            messages = info.messages_received,
            duration_secs = info.age_secs(),
            "Connection released"
        );
    }
}

async fn serve_session(
    socket: WebSocket,
    gw: SharedGateway,
    conn_id: Uuid,
    session_id: Uuid,
    pipeline: Option<Arc<ResearchPipeline>>,
    buffer: usize,
) {
    info!("Client connected");
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ResearchEvent>(buffer);
    let cancel = CancellationToken::new();

    // Writer: delivers events in order; a failed send ends the session's runs.
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(
        async move {
            while let Some(event) = rx.recv().await {
                let Some(frame) = event_frame(&event) else {
                    continue;
                };
                if ws_tx.send(frame).await.is_err() {
                    debug!("Socket write failed; cancelling session");
                    writer_cancel.cancel();
                    break;
                }
                debug!(kind = event.kind(), "Sent update");
                if event.is_terminal() {
                    debug!("Run finished; session ready for the next query");
                }
            }
            let _ = ws_tx.close().await;
        }
        .in_current_span(),
    );

    let mut session = ResearchSession::new(pipeline, tx, cancel.clone());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(_outcome) = session.join_run() => {
                gw.lock().await.sessions_mut().mark_idle(&session_id);
            }
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(t))) => t.to_string(),
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(error = %e, "Socket read failed");
                        break;
                    }
                };

                gw.lock().await.connections_mut().record_message(&conn_id);

                match session.handle_text(&text).await {
                    Ok(Submission::Started) => {
                        gw.lock().await.record_query_started(&session_id);
                    }
                    Ok(Submission::Rejected) => {}
                    Err(e) => {
                        debug!(error = %e, "Client unreachable");
                        break;
                    }
                }
            }
        }
    }

    info!("Client disconnected");
    session.close();
    drop(session);
    let _ = writer.await;
}

/// Start the gateway server on the configured address.
///
/// Runs until the listener fails or the task is cancelled.
pub async fn run(gw: SharedGateway) -> Result<(), std::io::Error> {
    let (addr, static_dir) = {
        let gw = gw.lock().await;
        (gw.config().bind_addr(), gw.config().static_dir.clone())
    };
    if let Some(dir) = &static_dir {
        info!(dir = %dir.display(), "Serving static files");
    }
    let app = router(gw, static_dir.as_deref());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "WebSocket gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
