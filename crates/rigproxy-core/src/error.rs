use std::net::SocketAddr;
use thiserror::Error;

/// Errors produced by the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The first line of a session is not a JSON object.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The first line parsed but is not a `login` call.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// A rig or pool stream broke mid-session.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect upstream {addr}: {source}")]
    Upstream {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Whether this error rejects a login rather than breaking a socket.
    pub fn is_login_rejection(&self) -> bool {
        matches!(
            self,
            RelayError::MalformedRequest(_) | RelayError::UnsupportedMethod(_)
        )
    }

    pub fn upstream(addr: impl ToString, source: std::io::Error) -> Self {
        RelayError::Upstream {
            addr: addr.to_string(),
            source,
        }
    }

    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        RelayError::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
