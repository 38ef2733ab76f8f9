//! Periodic registry snapshot.
//!
//! Writes the registry report as pretty-printed JSON to a fixed path on a
//! fixed interval. Best-effort: failures are logged and the next tick tries
//! again.

use crate::config::ReportConfig;
use crate::registry::RigRegistry;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Writes `report.json` snapshots of a [`RigRegistry`].
pub struct ReportWriter {
    path: PathBuf,
    interval: Duration,
    registry: RigRegistry,
}

impl ReportWriter {
    pub fn new(config: &ReportConfig, registry: RigRegistry) -> Self {
        Self {
            path: config.path.clone(),
            interval: config.interval,
            registry,
        }
    }

    /// Get the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Write a snapshot every interval, forever. The first write happens one
    /// full interval after start.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.write_once().await;
        }
    }

    /// Write one snapshot now. Errors are logged, not returned.
    pub async fn write_once(&self) {
        if let Err(e) = self.try_write().await {
            error!(path = %self.path.display(), error = %e, "failed to write report");
        }
    }

    async fn try_write(&self) -> std::io::Result<()> {
        let report = self.registry.report().await;
        let json = serde_json::to_string_pretty(&report)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.path, json).await?;

        debug!(path = %self.path.display(), rigs = report.rigs_count, "report written");
        Ok(())
    }
}
