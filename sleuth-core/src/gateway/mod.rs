//! # WebSocket Gateway
//!
//! Serves the research pipeline to browser clients over WebSocket. Each
//! connection is one session: it submits `{"query": ...}` messages and
//! receives the `{type, content}` events of its own runs, in order.

mod connection;
mod events;
mod server;
mod session;

pub use connection::{ConnectionInfo, ConnectionManager};
pub use events::{ResearchRequest, parse_request};
pub use server::{GatewayServer, SharedGateway, router as gateway_router, run as run_gateway};
pub use session::{ResearchSession, SessionManager, SessionRecord, SessionState, Submission};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Outbound events buffered per connection before a run waits on the socket.
    pub event_buffer: usize,
    /// Directory served at `/` (must contain `index.html`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            max_connections: 64,
            event_buffer: 32,
            static_dir: None,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8765);
        assert_eq!(config.max_connections, 64);
        assert!(config.static_dir.is_none());
        assert_eq!(config.bind_addr(), "127.0.0.1:8765");
    }

    #[test]
    fn test_gateway_config_serialization() {
        let config = GatewayConfig {
            host: "0.0.0.0".into(),
            port: 9090,
            max_connections: 5,
            event_buffer: 8,
            static_dir: Some(PathBuf::from("frontend")),
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.port, 9090);
        assert_eq!(restored.static_dir, Some(PathBuf::from("frontend")));
    }
}
