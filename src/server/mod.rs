//! Shell server.
//!
//! [`ShellServer`] owns everything sessions share: the backend handle,
//! the command registry, the access controller, the message printers and
//! the session table. It is cheap to clone; every clone refers to the
//! same server.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dht_shell::backend::MemoryBackend;
//! use dht_shell::command::CommandRegistry;
//! use dht_shell::security::AccessController;
//! use dht_shell::server::ShellServer;
//!
//! #[tokio::main]
//! async fn main() -> dht_shell::Result<()> {
//!     let server = ShellServer::new(
//!         Arc::new(MemoryBackend::default()),
//!         Arc::new(CommandRegistry::builtin()?),
//!         AccessController::disabled(),
//!     );
//!     let running = server.start(None, Some("127.0.0.1:3998".parse().unwrap())).await?;
//!     println!("listening on {:?}", running.local_addr());
//!     server.wait_halted().await;
//!     Ok(())
//! }
//! ```

mod interrupt;
mod listener;
mod table;

pub use interrupt::{InterruptCoordinator, InterruptSignal};
pub use table::{ServerPhase, SessionInfo, SessionTable};

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::command::{CommandRegistry, MessagePrinters};
use crate::error::DhtShellError;
use crate::security::AccessController;
use crate::session::{Session, SessionEnd, SessionId, Transport};
use crate::Result;

struct ServerInner {
    backend: Arc<dyn Backend>,
    registry: Arc<CommandRegistry>,
    access: AccessController,
    printers: MessagePrinters,
    table: SessionTable,
    interruptibles: Mutex<Vec<InterruptSignal>>,
}

/// Multiplexes console and remote sessions onto one backend.
#[derive(Clone)]
pub struct ShellServer {
    inner: Arc<ServerInner>,
}

impl ShellServer {
    /// Create a server with the default message printers.
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<CommandRegistry>,
        access: AccessController,
    ) -> Self {
        Self::with_printers(backend, registry, access, MessagePrinters::default())
    }

    /// Create a server with custom message printers.
    pub fn with_printers(
        backend: Arc<dyn Backend>,
        registry: Arc<CommandRegistry>,
        access: AccessController,
        printers: MessagePrinters,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                backend,
                registry,
                access,
                printers,
                table: SessionTable::new(),
                interruptibles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.inner.registry
    }

    pub fn access(&self) -> &AccessController {
        &self.inner.access
    }

    pub fn printers(&self) -> MessagePrinters {
        self.inner.printers
    }

    /// Register a signal that halt raises, so whatever waits on it wakes.
    pub fn add_interruptible(&self, signal: InterruptSignal) -> Result<()> {
        self.inner
            .interruptibles
            .lock()
            .map_err(|_| DhtShellError::LockPoisoned)?
            .push(signal);
        Ok(())
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.inner.table.subscribe()
    }

    /// Admit a session on `transport` and start its loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open_session(&self, transport: Transport) -> Result<SessionHandle> {
        let (id, closed) = self.inner.table.admit(transport.kind(), transport.peer())?;
        let session = Session::new(id, transport, self.clone(), closed);
        let task = tokio::spawn(session.run());
        Ok(SessionHandle { id, task })
    }

    /// Drop a session from the table. Called by the session on exit.
    pub fn release(&self, id: &SessionId) -> Result<Option<SessionInfo>> {
        let released = self.inner.table.remove(id)?;
        if let Some(info) = &released {
            debug!(session = %id, commands = info.commands, age = ?info.age(), "session released");
        }
        Ok(released)
    }

    pub fn record_command(&self, id: &SessionId) -> Result<()> {
        self.inner.table.record_command(id)
    }

    /// Snapshot of the open sessions, ordered by ID.
    pub fn sessions(&self) -> Result<Vec<SessionInfo>> {
        self.inner.table.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.inner.table.count()
    }

    pub fn is_accepting(&self) -> Result<bool> {
        self.inner.table.is_accepting()
    }

    pub fn is_halted(&self) -> Result<bool> {
        self.inner.table.is_halted()
    }

    /// Stop admitting remote sessions and suspend the backend.
    ///
    /// Open sessions keep running. Returns `false` if already suspended.
    pub fn suspend(&self) -> Result<bool> {
        let backend = &self.inner.backend;
        let changed = self.inner.table.suspend_with(|| backend.suspend())?;
        if changed {
            info!("shell suspended");
        }
        Ok(changed)
    }

    /// Admit remote sessions again and resume the backend.
    ///
    /// Returns `false` if the server was not suspended.
    pub fn resume(&self) -> Result<bool> {
        let backend = &self.inner.backend;
        let changed = self.inner.table.resume_with(|| backend.resume())?;
        if changed {
            info!("shell resumed");
        }
        Ok(changed)
    }

    /// Close every session, wake interruptible waits and stop the backend.
    ///
    /// Only the first call does anything; later calls return `false`.
    /// Blocks for as long as the backend takes to stop, so async callers
    /// should use [`ShellServer::shutdown`].
    pub fn halt(&self) -> Result<bool> {
        let Some(drained) = self.inner.table.begin_halt()? else {
            debug!("halt already in progress");
            return Ok(false);
        };

        info!(sessions = drained.len(), "halting shell");
        for (info, closer) in drained {
            debug!(session = %info.id, kind = %info.kind, "closing session");
            // The session may have exited on its own already.
            let _ = closer.send(());
        }

        let signals = match self.inner.interruptibles.lock() {
            Ok(signals) => signals.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for signal in signals {
            signal.raise();
        }

        self.inner.backend.stop();
        info!("shell halted");
        Ok(true)
    }

    /// [`ShellServer::halt`] from async code.
    pub async fn shutdown(&self) -> Result<bool> {
        let server = self.clone();
        tokio::task::spawn_blocking(move || server.halt())
            .await
            .map_err(|err| DhtShellError::Io(io::Error::other(err)))?
    }

    /// Wait until the server has been halted.
    pub async fn wait_halted(&self) {
        let mut phase = self.subscribe();
        // An error means the table is gone, which also means halted.
        let _ = phase.wait_for(|phase| *phase == ServerPhase::Halted).await;
    }

    /// Start serving.
    ///
    /// Binds `listen` first, so a bad address fails before any session
    /// opens, then opens the console session and spawns the acceptor.
    pub async fn start(
        &self,
        console: Option<Transport>,
        listen: Option<SocketAddr>,
    ) -> Result<RunningShell> {
        let listener = match listen {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                let local = listener.local_addr()?;
                Some((listener, local))
            }
            None => None,
        };

        let console = console
            .map(|transport| self.open_session(transport))
            .transpose()?;

        let (local_addr, acceptor) = match listener {
            Some((listener, local)) => {
                let task = tokio::spawn(listener::run_acceptor(self.clone(), listener, local));
                (Some(local), Some(task))
            }
            None => (None, None),
        };

        Ok(RunningShell {
            local_addr,
            console,
            acceptor,
        })
    }
}

/// Handle on a running session task.
pub struct SessionHandle {
    id: SessionId,
    task: JoinHandle<SessionEnd>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the session loop to end. `None` if the task panicked.
    pub async fn wait(self) -> Option<SessionEnd> {
        self.task.await.ok()
    }
}

/// What [`ShellServer::start`] brought up.
pub struct RunningShell {
    local_addr: Option<SocketAddr>,
    console: Option<SessionHandle>,
    acceptor: Option<JoinHandle<()>>,
}

impl RunningShell {
    /// Address the remote listener is bound to, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn take_console(&mut self) -> Option<SessionHandle> {
        self.console.take()
    }

    /// Wait for the acceptor to finish, which happens once halted.
    pub async fn join_acceptor(&mut self) {
        if let Some(task) = self.acceptor.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    use crate::backend::MemoryBackend;
    use crate::session::TransportKind;

    fn server() -> (ShellServer, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::default());
        let server = ShellServer::new(
            backend.clone(),
            Arc::new(CommandRegistry::builtin().unwrap()),
            AccessController::disabled(),
        );
        (server, backend)
    }

    fn duplex_transport(kind: TransportKind) -> (tokio::io::DuplexStream, Transport) {
        let (client, server_side) = duplex(4096);
        let (reader, writer) = tokio::io::split(server_side);
        (client, Transport::from_io(kind, reader, writer, false))
    }

    #[tokio::test]
    async fn test_halt_is_idempotent() {
        let (server, backend) = server();
        assert!(server.shutdown().await.unwrap());
        assert!(!server.shutdown().await.unwrap());
        assert!(!server.halt().unwrap());
        assert_eq!(backend.stop_calls(), 1);
        assert!(server.is_halted().unwrap());
    }

    #[test]
    fn test_concurrent_suspend_resume_keep_backend_in_step() {
        let (server, backend) = server();
        let mut threads = vec![];
        for worker in 0..8 {
            let server = server.clone();
            threads.push(std::thread::spawn(move || {
                for round in 0..200 {
                    if (worker + round) % 2 == 0 {
                        server.suspend().unwrap();
                    } else {
                        server.resume().unwrap();
                    }
                }
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(server.is_accepting().unwrap(), !backend.is_suspended());
        server.suspend().unwrap();
        assert!(backend.is_suspended());
        server.resume().unwrap();
        assert!(!backend.is_suspended());
    }

    #[tokio::test]
    async fn test_concurrent_halts_stop_backend_once() {
        let (server, backend) = server();
        let mut tasks = vec![];
        for _ in 0..8 {
            let server = server.clone();
            tasks.push(tokio::spawn(async move { server.shutdown().await.unwrap() }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(backend.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_open_after_halt_fails() {
        let (server, _) = server();
        server.shutdown().await.unwrap();
        let (_client, transport) = duplex_transport(TransportKind::Console);
        assert!(matches!(
            server.open_session(transport),
            Err(DhtShellError::Halted)
        ));
    }

    #[tokio::test]
    async fn test_suspend_refuses_remote_keeps_open_sessions() {
        let (server, backend) = server();
        let (mut client, transport) = duplex_transport(TransportKind::Remote);
        let _handle = server.open_session(transport).unwrap();

        assert!(server.suspend().unwrap());
        assert!(backend.is_suspended());
        assert!(!server.suspend().unwrap());

        let (_other, transport) = duplex_transport(TransportKind::Remote);
        assert!(matches!(
            server.open_session(transport),
            Err(DhtShellError::NotAccepting)
        ));

        // The already open session still answers.
        client.write_all(b"setttl 5\n").await.unwrap();
        let mut lines = BufReader::new(client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "ttl set to 5s");

        assert!(server.resume().unwrap());
        assert!(!backend.is_suspended());
        let (_other, transport) = duplex_transport(TransportKind::Remote);
        assert!(server.open_session(transport).is_ok());
    }

    #[tokio::test]
    async fn test_halt_raises_interruptibles() {
        let (server, _) = server();
        let signal = InterruptSignal::new();
        server.add_interruptible(signal.clone()).unwrap();

        server.shutdown().await.unwrap();
        assert!(signal.is_raised());
        tokio::time::timeout(Duration::from_secs(1), server.wait_halted())
            .await
            .expect("halted");
    }

    #[tokio::test]
    async fn test_sessions_listing_and_release() {
        let (server, _) = server();
        let (client, transport) = duplex_transport(TransportKind::Remote);
        let handle = server.open_session(transport).unwrap();
        let id = handle.id();

        let sessions = server.sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert_eq!(sessions[0].kind, TransportKind::Remote);

        drop(client);
        assert_eq!(handle.wait().await, Some(SessionEnd::EndOfInput));
        assert_eq!(server.session_count(), 0);
        assert!(server.release(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_without_listener() {
        let (server, _) = server();
        let (client, transport) = duplex_transport(TransportKind::Console);
        let mut running = server.start(Some(transport), None).await.unwrap();
        assert!(running.local_addr().is_none());

        let console = running.take_console().unwrap();
        drop(client);
        assert_eq!(console.wait().await, Some(SessionEnd::EndOfInput));
        running.join_acceptor().await;
    }

    #[tokio::test]
    async fn test_start_bind_failure_opens_nothing() {
        let (server, _) = server();
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let (_client, transport) = duplex_transport(TransportKind::Console);
        assert!(server.start(Some(transport), Some(addr)).await.is_err());
        assert_eq!(server.session_count(), 0);
    }
}
