//! Backend handle abstraction.
//!
//! The shell never looks inside the key-value store it exposes. Every
//! session holds a shared [`Backend`] trait object and calls it from a
//! blocking worker thread, so implementations may block for as long as
//! a network round trip takes.

mod memory;

pub use memory::MemoryBackend;

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a backend operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend is suspended and does not serve requests.
    #[error("backend is suspended")]
    Suspended,

    /// The backend has been stopped.
    #[error("backend has been stopped")]
    Stopped,

    /// A value could not be removed because the secret does not match.
    #[error("secret does not match for key {0}")]
    SecretMismatch(String),

    /// The contact address given to `join` is not usable.
    #[error("invalid contact: {0}")]
    InvalidContact(String),

    /// Any other failure inside the backend.
    #[error("{0}")]
    Other(String),
}

/// Backend configuration handed over by the bootstrap.
///
/// Apart from `ttl`, the fields are passed through untouched; the shell
/// does not interpret them.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Address this node advertises to others.
    pub self_address: Option<String>,
    /// Contact used to join an existing overlay at startup.
    pub bootstrap: Option<String>,
    /// Whether NAT traversal via UPnP should be attempted.
    pub upnp: bool,
    /// Default time-to-live for stored values.
    pub ttl: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            self_address: None,
            bootstrap: None,
            upnp: false,
            ttl: Duration::from_secs(3 * 60 * 60),
        }
    }
}

/// A value as returned by `get`, `put` and `remove`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueInfo {
    /// The stored value.
    pub value: String,
    /// Remaining time-to-live.
    pub ttl: Duration,
    /// Whether a secret guards removal of this value.
    pub protected: bool,
}

/// Snapshot of backend status.
#[derive(Debug, Clone, Default)]
pub struct BackendStatus {
    pub self_address: String,
    pub contact: Option<String>,
    pub upnp: bool,
    pub suspended: bool,
    pub stopped: bool,
    pub keys: usize,
    pub ttl: Duration,
    pub secret_set: bool,
}

/// Opaque capability to the long-lived store behind the shell.
///
/// Implementations must be safe for concurrent calls from many sessions.
pub trait Backend: Send + Sync {
    /// Report current status.
    fn status(&self) -> Result<BackendStatus, BackendError>;

    /// Join an overlay through the given contact (`host[:port]`).
    fn join(&self, contact: &str) -> Result<(), BackendError>;

    /// Fetch the values stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<ValueInfo>, BackendError>;

    /// Store `values` under `key` and return what was there before.
    fn put(&self, key: &str, values: &[String]) -> Result<Vec<ValueInfo>, BackendError>;

    /// Remove `values` from `key` (all values when empty) and return the
    /// removed ones.
    fn remove(&self, key: &str, values: &[String]) -> Result<Vec<ValueInfo>, BackendError>;

    /// Set the time-to-live used by later puts.
    fn set_ttl(&self, ttl: Duration) -> Result<(), BackendError>;

    /// Set or clear the secret attached to later puts and removes.
    fn set_secret(&self, secret: Option<String>) -> Result<(), BackendError>;

    /// Entries held locally by this node.
    fn local_entries(&self) -> Result<Vec<(String, Vec<ValueInfo>)>, BackendError>;

    /// Forget routing state (joined contacts).
    fn clear_routing(&self) -> Result<(), BackendError>;

    /// Stop serving requests until `resume`.
    fn suspend(&self);

    /// Resume after `suspend`.
    fn resume(&self);

    /// Shut the backend down for good.
    fn stop(&self);
}
