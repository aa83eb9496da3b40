//! Session lifecycle state.

/// Lifecycle state of a shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Session is reading and executing commands.
    #[default]
    Active,
    /// Transport has been released; the session is gone.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// The only valid transition is Active -> Closed.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        matches!((*self, target), (SessionState::Active, SessionState::Closed))
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::DhtShellError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}
