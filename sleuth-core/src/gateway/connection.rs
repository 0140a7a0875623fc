//! Admission and bookkeeping for live WebSocket clients.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages_received: u64,
}

impl ConnectionInfo {
    fn new(connection_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            connected_at: now,
            last_activity: now,
            messages_received: 0,
        }
    }

    /// Seconds since the client connected.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }
}

/// Capacity-limited registry of live clients.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    live: HashMap<Uuid, ConnectionInfo>,
    limit: usize,
    rejected: u64,
}

impl ConnectionManager {
    pub fn new(limit: usize) -> Self {
        Self {
            live: HashMap::new(),
            limit,
            rejected: 0,
        }
    }

    /// Admit a new client, or `None` when the server is full.
    pub fn admit(&mut self) -> Option<Uuid> {
        if self.is_full() {
            self.rejected += 1;
            return None;
        }
        let id = Uuid::new_v4();
        self.live.insert(id, ConnectionInfo::new(id));
        Some(id)
    }

    /// Forget a client, returning what was recorded about it.
    pub fn release(&mut self, id: &Uuid) -> Option<ConnectionInfo> {
        self.live.remove(id)
    }

    pub fn record_message(&mut self, id: &Uuid) {
        if let Some(info) = self.live.get_mut(id) {
            info.messages_received += 1;
            info.last_activity = Utc::now();
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&ConnectionInfo> {
        self.live.get(id)
    }

    pub fn is_full(&self) -> bool {
        self.live.len() >= self.limit
    }

    pub fn active_count(&self) -> usize {
        self.live.len()
    }

    /// Clients turned away since startup.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_stops_at_limit() {
        let mut mgr = ConnectionManager::new(2);
        assert!(mgr.admit().is_some());
        assert!(mgr.admit().is_some());
        assert!(mgr.is_full());
        assert!(mgr.admit().is_none());
        assert!(mgr.admit().is_none());
        assert_eq!(mgr.active_count(), 2);
        assert_eq!(mgr.rejected_count(), 2);
    }

    #[test]
    fn test_release_frees_a_slot() {
        let mut mgr = ConnectionManager::new(1);
        let id = mgr.admit().unwrap();
        assert!(mgr.admit().is_none());

        let info = mgr.release(&id).unwrap();
        assert_eq!(info.connection_id, id);
        assert!(mgr.release(&id).is_none());
        assert!(mgr.admit().is_some());
    }

    #[test]
    fn test_zero_limit_admits_nobody() {
        let mut mgr = ConnectionManager::new(0);
        assert!(mgr.admit().is_none());
        assert_eq!(mgr.rejected_count(), 1);
    }

    #[test]
    fn test_messages_are_counted() {
        let mut mgr = ConnectionManager::new(4);
        let id = mgr.admit().unwrap();
        mgr.record_message(&id);
        mgr.record_message(&id);
        mgr.record_message(&Uuid::new_v4());

        let info = mgr.get(&id).unwrap();
        assert_eq!(info.messages_received, 2);
        assert!(info.last_activity >= info.connected_at);
        assert!(info.age_secs() >= 0);
    }
}
