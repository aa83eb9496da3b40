//! Session table and server flags.
//!
//! The table, the accepting flag and the halted flag live behind one
//! mutex, so admitting a session, removing one and flipping a flag are
//! atomic with respect to each other.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{oneshot, watch};

use crate::error::DhtShellError;
use crate::session::{SessionId, SessionState, TransportKind};
use crate::Result;

/// Externally visible serving phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Accepting,
    Suspended,
    Halted,
}

/// Snapshot of one tracked session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub kind: TransportKind,
    pub peer: Option<SocketAddr>,
    pub state: SessionState,
    pub created_at: Instant,
    pub commands: u64,
}

impl SessionInfo {
    /// Time since the session was opened.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

struct SessionEntry {
    info: SessionInfo,
    closer: oneshot::Sender<()>,
}

struct TableState {
    sessions: HashMap<SessionId, SessionEntry>,
    accepting: bool,
    halted: bool,
}

/// Thread-safe session table.
pub struct SessionTable {
    state: Mutex<TableState>,
    phase: watch::Sender<ServerPhase>,
}

impl SessionTable {
    /// Create an empty table that accepts new sessions.
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ServerPhase::Accepting);
        Self {
            state: Mutex::new(TableState {
                sessions: HashMap::new(),
                accepting: true,
                halted: false,
            }),
            phase,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TableState>> {
        self.state.lock().map_err(|_| DhtShellError::LockPoisoned)
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    /// Add a session.
    ///
    /// Fails once halted; remote sessions are also refused while
    /// suspended. The returned receiver fires when the server wants the
    /// session's transport closed.
    pub fn admit(
        &self,
        kind: TransportKind,
        peer: Option<SocketAddr>,
    ) -> Result<(SessionId, oneshot::Receiver<()>)> {
        let mut state = self.lock()?;

        if state.halted {
            return Err(DhtShellError::Halted);
        }
        if kind == TransportKind::Remote && !state.accepting {
            return Err(DhtShellError::NotAccepting);
        }

        let id = SessionId::new();
        let (closer, closed) = oneshot::channel();
        state.sessions.insert(
            id,
            SessionEntry {
                info: SessionInfo {
                    id,
                    kind,
                    peer,
                    state: SessionState::Active,
                    created_at: Instant::now(),
                    commands: 0,
                },
                closer,
            },
        );
        Ok((id, closed))
    }

    /// Remove a session. Returns its final snapshot, or `None` if it was
    /// already gone (e.g. drained by halt).
    pub fn remove(&self, id: &SessionId) -> Result<Option<SessionInfo>> {
        let mut state = self.lock()?;
        Ok(state.sessions.remove(id).map(|entry| {
            let mut info = entry.info;
            info.state = SessionState::Closed;
            info
        }))
    }

    /// Count one executed command for a session.
    pub fn record_command(&self, id: &SessionId) -> Result<()> {
        let mut state = self.lock()?;
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| DhtShellError::SessionNotFound(id.to_string()))?;
        entry.info.commands += 1;
        Ok(())
    }

    /// Stop admitting remote sessions. Returns whether anything changed.
    pub fn suspend(&self) -> Result<bool> {
        self.suspend_with(|| {})
    }

    /// Admit remote sessions again. Returns whether anything changed.
    pub fn resume(&self) -> Result<bool> {
        self.resume_with(|| {})
    }

    /// Like [`SessionTable::suspend`], running `on_change` under the table
    /// lock when the flag flips.
    pub fn suspend_with(&self, on_change: impl FnOnce()) -> Result<bool> {
        self.set_accepting(false, on_change)
    }

    /// Like [`SessionTable::resume`], running `on_change` under the table
    /// lock when the flag flips.
    pub fn resume_with(&self, on_change: impl FnOnce()) -> Result<bool> {
        self.set_accepting(true, on_change)
    }

    fn set_accepting(&self, accepting: bool, on_change: impl FnOnce()) -> Result<bool> {
        let mut state = self.lock()?;
        if state.halted {
            return Err(DhtShellError::Halted);
        }
        if state.accepting == accepting {
            return Ok(false);
        }
        state.accepting = accepting;
        on_change();
        self.phase.send_replace(if accepting {
            ServerPhase::Accepting
        } else {
            ServerPhase::Suspended
        });
        Ok(true)
    }

    /// Enter the halted state and drain every session.
    ///
    /// Returns the closers of all drained sessions, remote ones first and
    /// the console last, or `None` if the table was already halted.
    pub fn begin_halt(&self) -> Result<Option<Vec<(SessionInfo, oneshot::Sender<()>)>>> {
        let mut state = self.lock()?;
        if state.halted {
            return Ok(None);
        }
        state.halted = true;
        state.accepting = false;
        self.phase.send_replace(ServerPhase::Halted);

        let mut drained: Vec<_> = state
            .sessions
            .drain()
            .map(|(_, entry)| (entry.info, entry.closer))
            .collect();
        drained.sort_by_key(|(info, _)| (info.kind == TransportKind::Console, info.id));
        Ok(Some(drained))
    }

    pub fn is_accepting(&self) -> Result<bool> {
        Ok(self.lock()?.accepting)
    }

    pub fn is_halted(&self) -> Result<bool> {
        Ok(self.lock()?.halted)
    }

    /// Get the number of tracked sessions.
    pub fn count(&self) -> usize {
        self.state.lock().map(|s| s.sessions.len()).unwrap_or(0)
    }

    /// Snapshot of all tracked sessions, ordered by ID.
    pub fn snapshot(&self) -> Result<Vec<SessionInfo>> {
        let state = self.lock()?;
        let mut infos: Vec<SessionInfo> =
            state.sessions.values().map(|e| e.info.clone()).collect();
        infos.sort_by_key(|info| info.id);
        Ok(infos)
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
