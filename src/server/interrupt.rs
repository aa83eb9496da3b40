//! Operator interrupt delivery.
//!
//! An [`InterruptSignal`] is attached to whatever the process blocks on:
//! the console session's read, or the park when the console is disabled.
//! Raising it wakes that wait. It never preempts a command that is
//! already running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct SignalInner {
    raised: AtomicBool,
    notify: Notify,
}

/// Sticky wake-up flag shared between the coordinator and one waiter.
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    inner: Arc<SignalInner>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake current waiters.
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Wait until the signal is raised; returns at once if it already was.
    pub async fn raised(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// Turns operator Ctrl-C into an [`InterruptSignal`].
pub struct InterruptCoordinator {
    signal: InterruptSignal,
}

impl InterruptCoordinator {
    pub fn new(signal: InterruptSignal) -> Self {
        Self { signal }
    }

    /// Deliver an interrupt as if the operator had sent one.
    pub fn interrupt(&self) {
        info!("interrupt received");
        self.signal.raise();
    }

    /// Listen for Ctrl-C in the background.
    pub fn spawn_ctrl_c(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = ?err, "failed to install ctrl-c handler");
                    return;
                }
                self.interrupt();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_raise_wakes_waiter() {
        let signal = InterruptSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.raised().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        InterruptCoordinator::new(signal.clone()).interrupt();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_raised_is_sticky() {
        let signal = InterruptSignal::new();
        signal.raise();
        assert!(signal.is_raised());
        tokio::time::timeout(Duration::from_millis(100), signal.raised())
            .await
            .expect("returns immediately");
    }
}
