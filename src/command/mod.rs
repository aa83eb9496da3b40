//! Shell commands.
//!
//! Commands are plain descriptors with a function-pointer handler. They
//! are collected into a [`CommandRegistry`] once at startup and shared by
//! every session.
//!
//! # Example
//!
//! ```
//! use dht_shell::command::CommandRegistry;
//!
//! let registry = CommandRegistry::builtin().unwrap();
//! assert!(registry.lookup("status").is_some());
//! assert!(registry.lookup("Status").is_none());
//! ```

mod builtin;
mod printer;
mod registry;

pub use builtin::BUILTIN_COMMANDS;
pub use printer::{print_no_command, print_ready, MessagePrinters, PrintFn, NO_SUCH_COMMAND, READY};
pub use registry::{Arity, Command, CommandRegistry, Flow, Handler};

use std::fmt::{Display, Write as _};

use thiserror::Error;

use crate::backend::{Backend, BackendError};
use crate::error::DhtShellError;
use crate::server::ShellServer;
use crate::session::{SessionId, CRLF};

/// Failure of a single command. Written back to the client; the session
/// keeps running.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Wrong number of arguments.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// An argument could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend rejected the operation.
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// The shell server could not carry out a control operation.
    #[error("{0}")]
    Shell(#[from] DhtShellError),
}

/// What a handler gets to work with.
pub struct CommandContext<'a> {
    server: &'a ShellServer,
    session: SessionId,
    out: &'a mut String,
}

impl<'a> CommandContext<'a> {
    pub fn new(server: &'a ShellServer, session: SessionId, out: &'a mut String) -> Self {
        Self {
            server,
            session,
            out,
        }
    }

    /// The shared backend handle.
    pub fn backend(&self) -> &dyn Backend {
        self.server.backend()
    }

    /// The server running this session.
    pub fn server(&self) -> &ShellServer {
        self.server
    }

    /// The session issuing the command.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Write one line of output.
    pub fn println(&mut self, line: impl Display) {
        let _ = write!(self.out, "{}", line);
        self.out.push_str(CRLF);
    }
}
