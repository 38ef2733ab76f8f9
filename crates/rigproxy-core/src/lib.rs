//! rigproxy-core: protocol-level pieces of the rig relay.
//!
//! Provides the error taxonomy, the login line rewriter, newline framing,
//! and the serializable registry report.

pub mod error;
pub mod framing;
pub mod login;
pub mod report;

// Re-export commonly used items at crate root.
pub use error::{RelayError, RelayResult};
pub use framing::{frame_line, LineDecoder, LineTooLong};
pub use login::{rewrite_login, LoginPolicy, LoginRewrite, DEFAULT_WALLET_MIN_LEN};
pub use report::{RigRecord, RigReport};
