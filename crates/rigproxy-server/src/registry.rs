//! Registry of logged-in rigs.
//!
//! One record per session that got past the login line, keyed by session id.
//! Sessions add themselves after a successful rewrite and remove themselves
//! once both sockets are closed.

use rigproxy_core::{RigRecord, RigReport};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Shared table of connected rigs.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct RigRegistry {
    rigs: Arc<RwLock<HashMap<String, RigRecord>>>,
}

impl RigRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rig that has just logged in.
    ///
    /// `login` and `agent` are the values the rig sent, before rewriting.
    pub async fn add(&self, session_id: &str, ip: IpAddr, login: &str, agent: Option<&str>) {
        let record = RigRecord {
            id: session_id.to_string(),
            ip: ip.to_string(),
            login: login.to_string(),
            ua: agent.map(str::to_owned),
            datetime: now_millis(),
        };

        let mut rigs = self.rigs.write().await;
        if rigs.contains_key(session_id) {
            // Ids are random per session; a clash means a caller bug.
            warn!(rig = %session_id, "session id already registered, keeping existing record");
            return;
        }
        rigs.insert(session_id.to_string(), record);

        info!(
            rig = %session_id,
            ip = %ip,
            login = %login,
            ua = agent.unwrap_or("-"),
            count = rigs.len(),
            "rig logged in"
        );
    }

    /// Drop a rig's record. Safe to call for unknown or already removed ids.
    pub async fn remove(&self, session_id: &str, had_error: bool) {
        let mut rigs = self.rigs.write().await;
        if let Some(record) = rigs.remove(session_id) {
            info!(
                rig = %session_id,
                ip = %record.ip,
                login = %record.login,
                had_error,
                count = rigs.len(),
                "rig disconnected"
            );
        }
    }

    /// Snapshot of all records. Order is unspecified.
    pub async fn report(&self) -> RigReport {
        let rigs = self.rigs.read().await;
        RigReport {
            rigs_count: rigs.len(),
            rigs: rigs.values().cloned().collect(),
        }
    }

    /// Number of registered rigs.
    pub async fn count(&self) -> usize {
        self.rigs.read().await.len()
    }

    #[cfg(test)]
    pub async fn contains(&self, session_id: &str) -> bool {
        self.rigs.read().await.contains_key(session_id)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
