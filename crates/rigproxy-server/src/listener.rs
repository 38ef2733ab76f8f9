//! Rig listener and pool dialer.
//!
//! [`RelayListener::bind`] opens one TCP listener per configured `[[proxy]]`
//! target. [`RelayListener::serve`] accepts rigs on it forever; each accepted
//! rig gets its own task, which dials the pool and then runs a [`Session`].
//! There is no admission limit and no retry of a failed pool dial.

use crate::config::Endpoint;
use crate::registry::RigRegistry;
use crate::session::Session;
use rigproxy_core::{LoginPolicy, RelayError, RelayResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

/// Pending connection backlog for each listener.
const LISTEN_BACKLOG: u32 = 1024;

/// Accepts rigs and pairs each with a fresh pool connection.
///
/// Cheap to clone; one instance is shared by every listen target.
#[derive(Clone)]
pub struct RelayListener {
    upstream: Endpoint,
    policy: Arc<LoginPolicy>,
    registry: RigRegistry,
    keepalive: bool,
    nodelay: bool,
}

impl RelayListener {
    pub fn new(
        upstream: Endpoint,
        policy: Arc<LoginPolicy>,
        registry: RigRegistry,
        keepalive: bool,
        nodelay: bool,
    ) -> Self {
        Self {
            upstream,
            policy,
            registry,
            keepalive,
            nodelay,
        }
    }

    /// Bind a listener on `target`.
    ///
    /// Keep-alive is set on the listening socket so accepted rig sockets
    /// inherit it.
    ///
    /// # Errors
    ///
    /// [`RelayError::Bind`] if the address cannot be resolved or bound.
    pub async fn bind(&self, target: &Endpoint) -> RelayResult<TcpListener> {
        let addr = resolve(target).await.map_err(|e| RelayError::Bind {
            addr: target.to_string(),
            source: e,
        })?;

        let listener = self
            .bind_addr(addr)
            .map_err(|e| RelayError::bind(addr, e))?;

        let local = listener.local_addr().unwrap_or(addr);
        info!(addr = %local, upstream = %self.upstream, "listening");
        Ok(listener)
    }

    fn bind_addr(&self, addr: SocketAddr) -> std::io::Result<TcpListener> {
        let socket = new_socket(addr)?;
        socket.set_reuseaddr(true)?;
        socket.set_keepalive(self.keepalive)?;
        socket.bind(addr)?;
        socket.listen(LISTEN_BACKLOG)
    }

    /// Accept rigs on `listener` until the task is dropped.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let relay = self.clone();
                    tokio::spawn(async move {
                        relay.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Dial the pool for a freshly accepted rig and run its session.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let session = self.accept_session(peer);
        debug!(rig = session.id(), peer = %peer, "rig connected");
        if let Err(e) = stream.set_nodelay(self.nodelay) {
            debug!(rig = session.id(), error = %e, "set_nodelay failed on rig socket");
        }

        let upstream = match self.dial_upstream().await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(rig = session.id(), peer = %peer, error = %e, "closing rig");
                return;
            }
        };

        session.run(stream, upstream).await;
    }

    /// Session for a rig accepted from `peer`. Its id is fixed from here on.
    fn accept_session(&self, peer: SocketAddr) -> Session {
        Session::new(peer, self.policy.clone(), self.registry.clone())
    }

    /// Open a connection to the pool, trying each resolved address in turn.
    pub async fn dial_upstream(&self) -> RelayResult<TcpStream> {
        let addrs: Vec<SocketAddr> = lookup_host((self.upstream.host.as_str(), self.upstream.port))
            .await
            .map_err(|e| RelayError::upstream(&self.upstream, e))?
            .collect();

        let mut last_err = std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no addresses resolved",
        );
        for addr in addrs {
            match self.connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(addr = %addr, error = %e, "pool connect attempt failed");
                    last_err = e;
                }
            }
        }
        Err(RelayError::upstream(&self.upstream, last_err))
    }

    async fn connect(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        let socket = new_socket(addr)?;
        socket.set_keepalive(self.keepalive)?;
        let stream = socket.connect(addr).await?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }
}

fn new_socket(addr: SocketAddr) -> std::io::Result<TcpSocket> {
    if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
}

async fn resolve(target: &Endpoint) -> std::io::Result<SocketAddr> {
    lookup_host((target.host.as_str(), target.port))
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{target} did not resolve"),
            )
        })
}
