//! In-process key-value backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{Backend, BackendConfig, BackendError, BackendStatus, ValueInfo};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
    secret: Option<String>,
}

impl StoredValue {
    fn info(&self, now: Instant) -> ValueInfo {
        ValueInfo {
            value: self.value.clone(),
            ttl: self.expires_at.saturating_duration_since(now),
            protected: self.secret.is_some(),
        }
    }
}

#[derive(Debug)]
struct Settings {
    ttl: Duration,
    secret: Option<String>,
    contact: Option<String>,
}

/// Thread-safe in-memory store standing in for a distributed one.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<StoredValue>>>,
    settings: RwLock<Settings>,
    self_address: String,
    upnp: bool,
    suspended: AtomicBool,
    stopped: AtomicBool,
    stop_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create a backend from configuration.
    pub fn new(config: BackendConfig) -> Self {
        let self_address = config
            .self_address
            .clone()
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            entries: RwLock::new(BTreeMap::new()),
            settings: RwLock::new(Settings {
                ttl: config.ttl,
                secret: None,
                contact: config.bootstrap,
            }),
            self_address,
            upnp: config.upnp,
            suspended: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// How many times `stop` has been invoked.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Whether the backend is suspended.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn ensure_serving(&self) -> Result<(), BackendError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(BackendError::Stopped);
        }
        if self.suspended.load(Ordering::SeqCst) {
            return Err(BackendError::Suspended);
        }
        Ok(())
    }

    fn lock_err<T>(_: T) -> BackendError {
        BackendError::Other("internal lock poisoned".to_string())
    }

    fn ttl_range_err() -> BackendError {
        BackendError::Other("ttl out of range".to_string())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

impl Backend for MemoryBackend {
    fn status(&self) -> Result<BackendStatus, BackendError> {
        let now = Instant::now();
        let keys = {
            let entries = self.entries.read().map_err(Self::lock_err)?;
            entries
                .values()
                .filter(|values| values.iter().any(|v| v.expires_at > now))
                .count()
        };
        let settings = self.settings.read().map_err(Self::lock_err)?;

        Ok(BackendStatus {
            self_address: self.self_address.clone(),
            contact: settings.contact.clone(),
            upnp: self.upnp,
            suspended: self.suspended.load(Ordering::SeqCst),
            stopped: self.stopped.load(Ordering::SeqCst),
            keys,
            ttl: settings.ttl,
            secret_set: settings.secret.is_some(),
        })
    }

    fn join(&self, contact: &str) -> Result<(), BackendError> {
        self.ensure_serving()?;

        let (host, port) = match contact.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (contact, None),
        };
        if host.is_empty() {
            return Err(BackendError::InvalidContact(contact.to_string()));
        }
        if let Some(port) = port {
            port.parse::<u16>()
                .map_err(|_| BackendError::InvalidContact(contact.to_string()))?;
        }

        let mut settings = self.settings.write().map_err(Self::lock_err)?;
        settings.contact = Some(contact.to_string());
        info!(contact, "joined overlay");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<ValueInfo>, BackendError> {
        self.ensure_serving()?;
        let now = Instant::now();
        let entries = self.entries.read().map_err(Self::lock_err)?;

        Ok(entries
            .get(key)
            .map(|values| {
                values
                    .iter()
                    .filter(|v| v.expires_at > now)
                    .map(|v| v.info(now))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put(&self, key: &str, values: &[String]) -> Result<Vec<ValueInfo>, BackendError> {
        self.ensure_serving()?;
        let (ttl, secret) = {
            let settings = self.settings.read().map_err(Self::lock_err)?;
            (settings.ttl, settings.secret.clone())
        };

        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or_else(Self::ttl_range_err)?;
        let mut entries = self.entries.write().map_err(Self::lock_err)?;
        let slot = entries.entry(key.to_string()).or_default();
        slot.retain(|v| v.expires_at > now);
        let previous = slot.iter().map(|v| v.info(now)).collect();

        for value in values {
            let stored = StoredValue {
                value: value.clone(),
                expires_at,
                secret: secret.clone(),
            };
            match slot.iter_mut().find(|v| v.value == *value) {
                Some(existing) => *existing = stored,
                None => slot.push(stored),
            }
        }

        debug!(key, count = values.len(), "stored values");
        Ok(previous)
    }

    fn remove(&self, key: &str, values: &[String]) -> Result<Vec<ValueInfo>, BackendError> {
        self.ensure_serving()?;
        let secret = self.settings.read().map_err(Self::lock_err)?.secret.clone();

        let now = Instant::now();
        let mut entries = self.entries.write().map_err(Self::lock_err)?;
        let Some(slot) = entries.get_mut(key) else {
            return Ok(Vec::new());
        };

        let targeted = |v: &StoredValue| values.is_empty() || values.contains(&v.value);
        if slot
            .iter()
            .any(|v| targeted(v) && v.secret.is_some() && v.secret != secret)
        {
            return Err(BackendError::SecretMismatch(key.to_string()));
        }

        let mut removed = Vec::new();
        slot.retain(|v| {
            if targeted(v) {
                if v.expires_at > now {
                    removed.push(v.info(now));
                }
                false
            } else {
                true
            }
        });
        if slot.is_empty() {
            entries.remove(key);
        }

        Ok(removed)
    }

    fn set_ttl(&self, ttl: Duration) -> Result<(), BackendError> {
        if ttl.is_zero() {
            return Err(BackendError::Other("ttl must be positive".to_string()));
        }
        if Instant::now().checked_add(ttl).is_none() {
            return Err(Self::ttl_range_err());
        }
        self.settings.write().map_err(Self::lock_err)?.ttl = ttl;
        Ok(())
    }

    fn set_secret(&self, secret: Option<String>) -> Result<(), BackendError> {
        self.settings.write().map_err(Self::lock_err)?.secret = secret;
        Ok(())
    }

    fn local_entries(&self) -> Result<Vec<(String, Vec<ValueInfo>)>, BackendError> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(Self::lock_err)?;

        Ok(entries
            .iter()
            .map(|(key, values)| {
                let live: Vec<ValueInfo> = values
                    .iter()
                    .filter(|v| v.expires_at > now)
                    .map(|v| v.info(now))
                    .collect();
                (key.clone(), live)
            })
            .filter(|(_, values)| !values.is_empty())
            .collect())
    }

    fn clear_routing(&self) -> Result<(), BackendError> {
        self.ensure_serving()?;
        self.settings.write().map_err(Self::lock_err)?.contact = None;
        Ok(())
    }

    fn suspend(&self) {
        if !self.suspended.swap(true, Ordering::SeqCst) {
            info!("backend suspended");
        }
    }

    fn resume(&self) {
        if self.suspended.swap(false, Ordering::SeqCst) {
            info!("backend resumed");
        }
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("backend stopped");
        }
    }
}
