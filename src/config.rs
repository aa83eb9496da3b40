//! Configuration management for dhtshell.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::backend::BackendConfig;
use crate::cli::Args;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell transports.
    pub shell: ShellSection,
    /// Remote access control.
    pub access: AccessSection,
    /// Options handed to the backend.
    pub backend: BackendSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Shell configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    /// Remote shell listen address.
    pub host: String,
    /// Remote shell port; negative disables remote listening.
    pub port: i32,
    /// Run without a console session.
    pub disable_stdin: bool,
    /// Console without prompts.
    pub batch: bool,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: -1,
            disable_stdin: false,
            batch: false,
        }
    }
}

/// Access control section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSection {
    /// Access-list file; unset admits every remote client.
    pub acl: Option<PathBuf>,
}

/// Backend configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub upnp: bool,
    pub self_address: Option<String>,
    pub bootstrap: Option<String>,
    /// Default value lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            upnp: false,
            self_address: None,
            bootstrap: None,
            ttl_secs: BackendConfig::default().ttl.as_secs(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log filter (error, warn, info, debug, trace, or a directive).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup (for testing).
    pub fn apply_vars<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("DHT_SHELL_HOST") {
            self.shell.host = host;
        }

        if let Some(port) = var("DHT_SHELL_PORT") {
            self.shell.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port))?;
        }

        if let Some(acl) = var("DHT_SHELL_ACL") {
            self.access.acl = (!acl.is_empty()).then(|| PathBuf::from(acl));
        }

        if let Some(level) = var("DHT_SHELL_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.shell.host = host.to_string();
        }
        if let Some(port) = args.port {
            self.shell.port = port;
        }
        if args.disable_stdin {
            self.shell.disable_stdin = true;
        }
        if args.batch {
            self.shell.batch = true;
        }

        if let Some(ref acl) = args.acl {
            self.access.acl = Some(acl.clone());
        }

        if args.upnp {
            self.backend.upnp = true;
        }
        if let Some(ref address) = args.self_address {
            self.backend.self_address = Some(address.clone());
        }
        if let Some(ref contact) = args.bootstrap {
            self.backend.bootstrap = Some(contact.clone());
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_address()?;
        let ttl = Duration::from_secs(self.backend.ttl_secs);
        if ttl.is_zero() || Instant::now().checked_add(ttl).is_none() {
            return Err(ConfigError::InvalidTtl);
        }
        Ok(())
    }

    /// Remote shell address, or `None` when remote listening is disabled.
    pub fn listen_address(&self) -> Result<Option<SocketAddr>, ConfigError> {
        if self.shell.port < 0 {
            return Ok(None);
        }
        let port = u16::try_from(self.shell.port)
            .map_err(|_| ConfigError::InvalidPort(self.shell.port.to_string()))?;
        let host: IpAddr = self
            .shell
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.shell.host.clone()))?;
        Ok(Some(SocketAddr::new(host, port)))
    }

    /// Options for constructing the backend.
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            self_address: self.backend.self_address.clone(),
            bootstrap: self.backend.bootstrap.clone(),
            upnp: self.backend.upnp,
            ttl: Duration::from_secs(self.backend.ttl_secs),
        }
    }

    pub fn acl_path(&self) -> Option<&Path> {
        self.access.acl.as_deref()
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid listen address.
    InvalidHost(String),
    /// Port outside the valid range.
    InvalidPort(String),
    /// Value lifetime of zero.
    InvalidTtl,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidPort(port) => write!(f, "invalid port: {}", port),
            Self::InvalidTtl => write!(f, "ttl_secs must be positive and within range"),
        }
    }
}

impl std::error::Error for ConfigError {}
