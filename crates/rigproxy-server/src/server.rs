//! Relay server: owns the registry and wires listeners and the snapshot
//! writer together.

use crate::config::RelayConfig;
use crate::listener::RelayListener;
use crate::registry::RigRegistry;
use crate::snapshot::ReportWriter;
use rigproxy_core::RelayResult;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::info;

/// The rigproxy server instance.
pub struct RelayServer {
    config: RelayConfig,
    registry: RigRegistry,
    relay: RelayListener,
}

impl RelayServer {
    /// Create a new server with an empty registry.
    pub fn new(config: RelayConfig) -> Self {
        let registry = RigRegistry::new();
        let relay = RelayListener::new(
            config.upstream.clone(),
            Arc::new(config.policy.clone()),
            registry.clone(),
            config.keepalive,
            config.nodelay,
        );
        Self {
            config,
            registry,
            relay,
        }
    }

    pub fn registry(&self) -> &RigRegistry {
        &self.registry
    }

    /// Bind every configured listen target. Fails on the first target that
    /// cannot be bound.
    pub async fn bind(&self) -> RelayResult<Vec<TcpListener>> {
        let mut listeners = Vec::with_capacity(self.config.listen.len());
        for target in &self.config.listen {
            listeners.push(self.relay.bind(target).await?);
        }
        Ok(listeners)
    }

    /// Serve rigs on `listeners` and write snapshots, until the future is
    /// dropped.
    pub async fn run(&self, listeners: Vec<TcpListener>) {
        let mut tasks = JoinSet::new();
        for listener in listeners {
            tasks.spawn(self.relay.clone().serve(listener));
        }
        if let Some(writer) = self.report_writer() {
            info!(
                path = %writer.path().display(),
                interval_secs = writer.interval().as_secs(),
                "writing rig reports"
            );
            tasks.spawn(writer.run());
        }

        while tasks.join_next().await.is_some() {}
    }

    /// Write one last snapshot, if reporting is enabled.
    pub async fn write_final_report(&self) {
        if let Some(writer) = self.report_writer() {
            writer.write_once().await;
        }
    }

    fn report_writer(&self) -> Option<ReportWriter> {
        self.config
            .report
            .as_ref()
            .map(|cfg| ReportWriter::new(cfg, self.registry.clone()))
    }
}
