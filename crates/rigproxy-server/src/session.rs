//! Per-connection relay.
//!
//! A [`Session`] owns one rig socket and one pool socket. The first non-empty
//! line from the rig goes through [`rewrite_login`]; after that every rig line
//! is forwarded verbatim (re-terminated with `\n`) and pool bytes are copied
//! back to the rig as they arrive. When either side closes or fails, both are
//! closed and the rig's registry record is dropped.
//!
//! ```text
//! AwaitingLogin ──rewrite ok──▶ Relaying ──close──▶ Closing
//!       │                                             ▲
//!       └──────────── rewrite failed / close ─────────┘
//! ```

use crate::registry::RigRegistry;
use rand::Rng;
use rigproxy_core::{
    frame_line, rewrite_login, LineDecoder, LineTooLong, LoginPolicy, RelayError, RelayResult,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Read buffer size for each direction.
const READ_BUF_SIZE: usize = 16 * 1024;

/// Longest rig line accepted, login included. A rig that sends more without
/// a newline is disconnected.
const MAX_LINE_LEN: usize = 16 * 1024;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the rig's first non-empty line.
    AwaitingLogin,
    /// Login forwarded; relaying raw traffic.
    Relaying,
    /// Tearing down. Terminal.
    Closing,
}

/// Which side ended the session.
#[derive(Debug)]
enum Closed {
    Client(RelayResult<()>),
    Upstream(std::io::Result<()>),
}

/// One rig connection and its pool connection.
pub struct Session {
    id: String,
    peer: SocketAddr,
    state: SessionState,
    policy: Arc<LoginPolicy>,
    registry: RigRegistry,
    had_error: bool,
}

impl Session {
    /// Create a session for a freshly accepted rig.
    pub fn new(peer: SocketAddr, policy: Arc<LoginPolicy>, registry: RigRegistry) -> Self {
        Self {
            id: generate_session_id(),
            peer,
            state: SessionState::AwaitingLogin,
            policy,
            registry,
            had_error: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Relay between `client` and `upstream` until either side closes.
    ///
    /// Never fails: transport errors and rejected logins end the session and
    /// are logged.
    pub async fn run<C, U>(mut self, client: C, upstream: U)
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
        U: AsyncRead + AsyncWrite + Unpin + Send,
    {
        debug!(rig = %self.id, peer = %self.peer, "session opened");

        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        let (mut upstream_rd, mut upstream_wr) = tokio::io::split(upstream);
        let id = self.id.clone();

        let closed = tokio::select! {
            res = self.pump_client(&mut client_rd, &mut upstream_wr) => Closed::Client(res),
            res = pump_upstream(&id, &mut upstream_rd, &mut client_wr) => Closed::Upstream(res),
        };

        match closed {
            Closed::Client(Ok(())) => debug!(rig = %id, "rig closed connection"),
            Closed::Client(Err(e)) if e.is_login_rejection() => {
                warn!(rig = %id, peer = %self.peer, error = %e, "login rejected");
            }
            Closed::Client(Err(e)) => {
                debug!(rig = %id, error = %e, "rig transport error");
                self.had_error = true;
            }
            Closed::Upstream(Ok(())) => debug!(rig = %id, "pool closed connection"),
            Closed::Upstream(Err(e)) => {
                debug!(rig = %id, error = %e, "pool transport error");
                self.had_error = true;
            }
        }

        if self.begin_close() {
            let _ = upstream_wr.shutdown().await;
            let _ = client_wr.shutdown().await;
            self.registry.remove(&self.id, self.had_error).await;
        }

        debug!(rig = %id, had_error = self.had_error, "session closed");
    }

    /// Enter `Closing`. Returns `false` if the session was already closing.
    fn begin_close(&mut self) -> bool {
        if self.state == SessionState::Closing {
            return false;
        }
        self.state = SessionState::Closing;
        true
    }

    /// Rig → pool direction. `Ok(())` on rig EOF.
    async fn pump_client<R, W>(&mut self, client: &mut R, upstream: &mut W) -> RelayResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut decoder = LineDecoder::new(MAX_LINE_LEN);
        let mut buf = vec![0u8; READ_BUF_SIZE];

        loop {
            let n = client.read(&mut buf).await?;
            if n == 0 {
                if let Some(tail) = decoder.finish() {
                    self.handle_line(&tail, upstream).await?;
                }
                return Ok(());
            }
            let lines = decoder
                .feed(&buf[..n])
                .map_err(|e| self.oversized_line(e))?;
            for line in lines {
                self.handle_line(&line, upstream).await?;
            }
        }
    }

    /// Before login an oversized line is a bad login; afterwards it breaks
    /// the stream.
    fn oversized_line(&self, err: LineTooLong) -> RelayError {
        match self.state {
            SessionState::AwaitingLogin => RelayError::MalformedRequest(format!("login {err}")),
            _ => RelayError::Transport(format!("rig {err}")),
        }
    }

    async fn handle_line<W>(&mut self, line: &[u8], upstream: &mut W) -> RelayResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        if line.is_empty() {
            return Ok(());
        }

        match self.state {
            SessionState::AwaitingLogin => {
                let text = String::from_utf8_lossy(line);
                let rewrite = rewrite_login(&text, &self.policy)?;
                upstream.write_all(rewrite.line.as_bytes()).await?;
                self.state = SessionState::Relaying;
                self.registry
                    .add(
                        &self.id,
                        self.peer.ip(),
                        &rewrite.login,
                        rewrite.agent.as_deref(),
                    )
                    .await;
            }
            SessionState::Relaying => {
                upstream.write_all(&frame_line(line)).await?;
            }
            SessionState::Closing => {}
        }
        Ok(())
    }
}

/// Pool → rig direction. Bytes are copied as they arrive. `Ok(())` on pool EOF.
async fn pump_upstream<R, W>(id: &str, upstream: &mut R, client: &mut W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = upstream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        client.write_all(&buf[..n]).await?;
        trace!(rig = %id, bytes = n, "pool → rig");
    }
}

fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}
