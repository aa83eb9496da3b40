//! Per-transport command loop.

use std::io;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{SessionId, SessionState, Transport, CRLF};
use crate::command::{CommandContext, Flow};
use crate::server::{InterruptSignal, ShellServer};

/// Upper bound on flushing a transport that is being torn down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed its input.
    EndOfInput,
    /// The client issued `quit` or `halt`.
    Quit,
    /// The server closed the transport (halt).
    Closed,
    /// The interrupt signal woke a blocked read.
    Interrupted,
    /// Reading or writing the transport failed.
    Failed,
}

/// Whether a response reached the transport before the server closed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Closed,
}

/// One client's read-dispatch-write loop.
pub struct Session {
    id: SessionId,
    transport: Transport,
    server: ShellServer,
    closed: oneshot::Receiver<()>,
    state: SessionState,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        transport: Transport,
        server: ShellServer,
        closed: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            id,
            transport,
            server,
            closed,
            state: SessionState::Active,
        }
    }

    /// Run until the client leaves, the server closes the transport, or
    /// the transport fails. The session is removed from the server's
    /// table on the way out.
    pub async fn run(mut self) -> SessionEnd {
        info!(
            session = %self.id,
            kind = %self.transport.kind,
            peer = ?self.transport.peer,
            "session opened"
        );

        let end = match self.serve().await {
            Ok(end) => end,
            Err(err) => {
                warn!(session = %self.id, error = %err, "session transport failed");
                SessionEnd::Failed
            }
        };

        // A peer that stopped reading must not hold the session open.
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.transport.output.shutdown()).await;
        if let Err(err) = self.state.transition_to(SessionState::Closed) {
            debug!(session = %self.id, error = %err, "session already closed");
        }
        if let Err(err) = self.server.release(&self.id) {
            warn!(session = %self.id, error = %err, "failed to release session");
        }

        info!(session = %self.id, reason = ?end, "session closed");
        end
    }

    async fn serve(&mut self) -> io::Result<SessionEnd> {
        if self.transport.interactive {
            let mut out = String::new();
            (self.server.printers().ready)(&mut out, None);
            if self.write(&out).await? == Delivery::Closed {
                return Ok(SessionEnd::Closed);
            }
        }

        loop {
            let Transport {
                input, interrupt, ..
            } = &mut self.transport;

            let line = tokio::select! {
                biased;
                _ = &mut self.closed => return Ok(SessionEnd::Closed),
                _ = wait_interrupt(interrupt.as_ref()) => return Ok(SessionEnd::Interrupted),
                line = input.next_line() => line?,
            };

            let Some(line) = line else {
                return Ok(SessionEnd::EndOfInput);
            };

            if let Some(end) = self.execute(&line).await? {
                return Ok(end);
            }
        }
    }

    /// Execute one input line and write its response. Returns how the
    /// session ends, or `None` to keep reading.
    async fn execute(&mut self, line: &str) -> io::Result<Option<SessionEnd>> {
        let mut tokens = line.split_whitespace().map(str::to_string);
        let mut out = String::new();

        let flow = match tokens.next() {
            Some(name) => self.dispatch(name, tokens.collect(), &mut out).await,
            None => Flow::Continue,
        };

        if flow == Flow::Continue && self.transport.interactive {
            (self.server.printers().ready)(&mut out, None);
        }
        if self.write(&out).await? == Delivery::Closed {
            return Ok(Some(SessionEnd::Closed));
        }
        Ok((flow == Flow::Close).then_some(SessionEnd::Quit))
    }

    async fn dispatch(&mut self, name: String, args: Vec<String>, out: &mut String) -> Flow {
        let Some(command) = self.server.registry().lookup(&name).copied() else {
            debug!(session = %self.id, command = %name, "no such command");
            (self.server.printers().no_command)(out, Some(name.as_str()));
            return Flow::Continue;
        };

        if let Err(err) = self.server.record_command(&self.id) {
            debug!(session = %self.id, error = %err, "command not recorded");
        }
        debug!(session = %self.id, command = %name, args = args.len(), "dispatching");

        // Backend calls may block for a long time.
        let server = self.server.clone();
        let id = self.id;
        let joined = tokio::task::spawn_blocking(move || {
            let mut text = String::new();
            let result = {
                let mut ctx = CommandContext::new(&server, id, &mut text);
                command.invoke(&mut ctx, &args)
            };
            (result, text)
        })
        .await;

        match joined {
            Ok((Ok(flow), text)) => {
                out.push_str(&text);
                flow
            }
            Ok((Err(err), text)) => {
                debug!(session = %self.id, command = %name, error = %err, "command failed");
                out.push_str(&text);
                out.push_str("error: ");
                out.push_str(&err.to_string());
                out.push_str(CRLF);
                Flow::Continue
            }
            Err(err) => {
                warn!(session = %self.id, command = %name, error = %err, "command handler panicked");
                out.push_str("error: command failed unexpectedly");
                out.push_str(CRLF);
                Flow::Continue
            }
        }
    }

    /// Write a response, giving up as soon as the server closes the session.
    async fn write(&mut self, out: &str) -> io::Result<Delivery> {
        if out.is_empty() {
            return Ok(Delivery::Sent);
        }
        let output = &mut self.transport.output;
        tokio::select! {
            biased;
            _ = &mut self.closed => Ok(Delivery::Closed),
            written = async {
                output.write_all(out.as_bytes()).await?;
                output.flush().await
            } => written.map(|()| Delivery::Sent),
        }
    }
}

async fn wait_interrupt(signal: Option<&InterruptSignal>) {
    match signal {
        Some(signal) => signal.raised().await,
        None => std::future::pending().await,
    }
}
