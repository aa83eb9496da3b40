//! # dht-shell
//!
//! Interactive command shell for a key-value store node.
//!
//! One long-lived backend is shared by a local console session and any
//! number of remote sessions accepted over TCP. Every session reads
//! whitespace-separated command lines, dispatches them through a shared
//! command registry and writes the results back on its own transport.
//!
//! ## Features
//!
//! - **Session multiplexing**: console and remote sessions run as
//!   independent tasks against one backend
//! - **Access control**: optional allow/deny list checked per connection
//! - **Suspend, resume, halt**: server-wide control from any session
//! - **Interrupts**: Ctrl-C wakes a blocked console read for an orderly exit
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dht_shell::{AccessController, CommandRegistry, MemoryBackend, ShellServer, Transport};
//!
//! #[tokio::main]
//! async fn main() -> dht_shell::Result<()> {
//!     dht_shell::logging::try_init().ok();
//!
//!     let server = ShellServer::new(
//!         Arc::new(MemoryBackend::default()),
//!         Arc::new(CommandRegistry::builtin()?),
//!         AccessController::disabled(),
//!     );
//!
//!     let console = Transport::console(true)?;
//!     let listen = "0.0.0.0:3998".parse().ok();
//!     let mut running = server.start(Some(console), listen).await?;
//!
//!     if let Some(console) = running.take_console() {
//!         console.wait().await;
//!     }
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod security;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use backend::{Backend, BackendConfig, BackendError, MemoryBackend};
pub use command::{Command, CommandContext, CommandError, CommandRegistry, Flow};
pub use error::{DhtShellError, Result};
pub use security::{AccessController, AccessList};
pub use server::{InterruptCoordinator, InterruptSignal, RunningShell, SessionHandle, ShellServer};
pub use session::{SessionEnd, SessionId, SessionState, Transport, TransportKind};
