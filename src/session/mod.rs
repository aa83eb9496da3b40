//! Session module.
//!
//! A session is one client's command loop bound to one transport, either
//! the local console or an accepted TCP connection.

mod id;
mod shell;
mod state;
mod transport;

pub use id::SessionId;
pub use shell::{Session, SessionEnd};
pub use state::SessionState;
pub use transport::{LineInput, Transport, TransportKind};

/// Line terminator used on every transport.
pub const CRLF: &str = "\r\n";
