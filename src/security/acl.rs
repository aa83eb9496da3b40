//! Access list for remote shell connections.
//!
//! The list file holds one entry per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! allow 192.168.0.0/16
//! deny  10.0.0.13
//! 10.0.0.0/8          # a bare pattern means allow
//! allow *
//! ```
//!
//! Entries are checked top to bottom and the first match decides. An
//! address that matches nothing is denied.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Access list loading errors.
#[derive(Error, Debug)]
pub enum AclError {
    /// The list file could not be read.
    #[error("failed to read access list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be parsed.
    #[error("access list line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Decision attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Address pattern of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPattern {
    /// Matches every address.
    Any,
    /// Matches one address.
    Exact(IpAddr),
    /// Matches a network block.
    Network { base: IpAddr, prefix: u8 },
}

impl AddressPattern {
    /// Check whether `addr` falls under this pattern.
    pub fn matches(&self, addr: IpAddr) -> bool {
        let addr = canonical(addr);
        match *self {
            Self::Any => true,
            Self::Exact(ip) => canonical(ip) == addr,
            Self::Network { base, prefix } => match (canonical(base), addr) {
                (IpAddr::V4(base), IpAddr::V4(addr)) => match 32u32.checked_sub(prefix.into()) {
                    Some(host_bits) => {
                        let mask = u32::MAX.checked_shl(host_bits).unwrap_or(0);
                        u32::from(base) & mask == u32::from(addr) & mask
                    }
                    None => false,
                },
                (IpAddr::V6(base), IpAddr::V6(addr)) => match 128u32.checked_sub(prefix.into()) {
                    Some(host_bits) => {
                        let mask = u128::MAX.checked_shl(host_bits).unwrap_or(0);
                        u128::from(base) & mask == u128::from(addr) & mask
                    }
                    None => false,
                },
                _ => false,
            },
        }
    }
}

/// IPv4-mapped IPv6 peers compare as their IPv4 form.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

impl FromStr for AddressPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" || s.eq_ignore_ascii_case("all") {
            return Ok(Self::Any);
        }

        match s.split_once('/') {
            Some((base, prefix)) => {
                let base: IpAddr = base
                    .parse()
                    .map_err(|_| format!("invalid network address '{}'", base))?;
                let max = if base.is_ipv4() { 32 } else { 128 };
                let bits: u8 = prefix
                    .parse()
                    .ok()
                    .filter(|p| *p <= max)
                    .ok_or_else(|| format!("invalid prefix length '{}'", prefix))?;

                // Mapped blocks are stored in IPv4 form, matching how peers compare.
                match base {
                    IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                        Some(v4) => {
                            let bits = bits.checked_sub(96).ok_or_else(|| {
                                format!("prefix length '{}' too short for a mapped address", prefix)
                            })?;
                            Ok(Self::Network {
                                base: IpAddr::V4(v4),
                                prefix: bits,
                            })
                        }
                        None => Ok(Self::Network { base, prefix: bits }),
                    },
                    IpAddr::V4(_) => Ok(Self::Network { base, prefix: bits }),
                }
            }
            None => s
                .parse()
                .map(Self::Exact)
                .map_err(|_| format!("invalid address '{}'", s)),
        }
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(ip) => write!(f, "{}", ip),
            Self::Network { base, prefix } => write!(f, "{}/{}", base, prefix),
        }
    }
}

/// One access list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclEntry {
    pub decision: Decision,
    pub pattern: AddressPattern,
}

/// Parsed access list.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    entries: Vec<AclEntry>,
}

impl AccessList {
    /// Load an access list from a file.
    pub fn load(path: &Path) -> Result<Self, AclError> {
        let content = std::fs::read_to_string(path).map_err(|source| AclError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse access list text.
    pub fn parse(content: &str) -> Result<Self, AclError> {
        let mut entries = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let malformed = |reason: String| AclError::Malformed {
                line: index + 1,
                reason,
            };

            let tokens: Vec<&str> = line.split_whitespace().collect();
            let (decision, pattern) = match tokens.as_slice() {
                [pattern] => (Decision::Allow, *pattern),
                [verb, pattern] if verb.eq_ignore_ascii_case("allow") => {
                    (Decision::Allow, *pattern)
                }
                [verb, pattern] if verb.eq_ignore_ascii_case("deny") => (Decision::Deny, *pattern),
                [verb, _] => return Err(malformed(format!("unknown directive '{}'", verb))),
                _ => return Err(malformed(format!("unexpected tokens in '{}'", line))),
            };

            entries.push(AclEntry {
                decision,
                pattern: pattern.parse().map_err(malformed)?,
            });
        }

        Ok(Self { entries })
    }

    /// Entries in file order.
    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// Check whether `addr` is allowed.
    pub fn permits(&self, addr: IpAddr) -> bool {
        self.entries
            .iter()
            .find(|entry| entry.pattern.matches(addr))
            .is_some_and(|entry| entry.decision == Decision::Allow)
    }
}

/// Gate consulted once per incoming remote connection.
///
/// Without a loaded list every connection is admitted.
#[derive(Debug, Clone, Default)]
pub struct AccessController {
    list: Option<AccessList>,
}

impl AccessController {
    /// A controller that admits everyone.
    pub fn disabled() -> Self {
        Self { list: None }
    }

    /// A controller enforcing `list`.
    pub fn new(list: AccessList) -> Self {
        Self { list: Some(list) }
    }

    /// Build from an optional list file; a given but unreadable or
    /// malformed file is an error.
    pub fn from_path(path: Option<&Path>) -> Result<Self, AclError> {
        match path {
            Some(path) => AccessList::load(path).map(Self::new),
            None => Ok(Self::disabled()),
        }
    }

    /// Check if access control is enforced.
    pub fn is_enabled(&self) -> bool {
        self.list.is_some()
    }

    /// Decide whether a client at `addr` may open a session.
    pub fn permit(&self, addr: IpAddr) -> bool {
        match &self.list {
            Some(list) => list.permits(addr),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_disabled_permits_everyone() {
        let ac = AccessController::disabled();
        assert!(!ac.is_enabled());
        assert!(ac.permit(ip("203.0.113.9")));
        assert!(ac.permit(ip("::1")));
    }

    #[test]
    fn test_first_match_wins() {
        let list = AccessList::parse("deny 10.0.0.13\nallow 10.0.0.0/8\n").unwrap();
        assert!(!list.permits(ip("10.0.0.13")));
        assert!(list.permits(ip("10.1.2.3")));
        assert!(!list.permits(ip("192.168.1.1")));
    }

    #[test]
    fn test_bare_pattern_and_comments() {
        let content = "# trusted hosts\n\n127.0.0.1   # loopback\n  \n";
        let list = AccessList::parse(content).unwrap();
        assert_eq!(list.entries().len(), 1);
        assert_eq!(list.entries()[0].decision, Decision::Allow);
        assert!(list.permits(ip("127.0.0.1")));
    }

    #[test]
    fn test_wildcard() {
        let list = AccessList::parse("deny 192.0.2.1\nallow *\n").unwrap();
        assert!(!list.permits(ip("192.0.2.1")));
        assert!(list.permits(ip("198.51.100.7")));
        assert!(list.permits(ip("2001:db8::1")));
    }

    #[test]
    fn test_ipv6_network() {
        let list = AccessList::parse("allow 2001:db8::/32").unwrap();
        assert!(list.permits(ip("2001:db8:1::5")));
        assert!(!list.permits(ip("2001:db9::1")));
    }

    #[test]
    fn test_ipv4_mapped_peer() {
        let list = AccessList::parse("allow 127.0.0.1").unwrap();
        assert!(list.permits(ip("::ffff:127.0.0.1")));
    }

    #[test]
    fn test_mapped_network_pattern() {
        let list = AccessList::parse("allow ::ffff:10.0.0.0/104").unwrap();
        assert_eq!(
            list.entries()[0].pattern,
            AddressPattern::Network {
                base: ip("10.0.0.0"),
                prefix: 8
            }
        );
        assert!(list.permits(ip("10.20.30.40")));
        assert!(list.permits(ip("::ffff:10.1.1.1")));
        assert!(!list.permits(ip("192.168.1.1")));

        let err = AccessList::parse("allow ::ffff:10.0.0.0/64").unwrap_err();
        assert!(matches!(err, AclError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_out_of_range_prefix_never_matches() {
        let pattern = AddressPattern::Network {
            base: ip("10.0.0.0"),
            prefix: 104,
        };
        assert!(!pattern.matches(ip("192.168.1.1")));
        assert!(!pattern.matches(ip("10.0.0.1")));
    }

    #[test]
    fn test_zero_prefix_matches_all_v4() {
        let list = AccessList::parse("allow 0.0.0.0/0").unwrap();
        assert!(list.permits(ip("8.8.8.8")));
        assert!(!list.permits(ip("2001:db8::1")));
    }

    #[test]
    fn test_malformed_lines() {
        let err = AccessList::parse("allow 10.0.0.1\npermit 10.0.0.2\n").unwrap_err();
        assert!(matches!(err, AclError::Malformed { line: 2, .. }));

        let err = AccessList::parse("allow 10.0.0.0/33").unwrap_err();
        assert!(err.to_string().contains("prefix"));

        let err = AccessList::parse("allow not-an-ip").unwrap_err();
        assert!(matches!(err, AclError::Malformed { line: 1, .. }));

        assert!(AccessList::parse("allow 1.2.3.4 extra").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "allow 127.0.0.0/8").unwrap();

        let ac = AccessController::from_path(Some(file.path())).unwrap();
        assert!(ac.is_enabled());
        assert!(ac.permit(ip("127.0.0.1")));
        assert!(!ac.permit(ip("192.168.0.1")));
    }

    #[test]
    fn test_unreadable_file() {
        let result = AccessController::from_path(Some(Path::new("/nonexistent/dht-shell.acl")));
        assert!(matches!(result, Err(AclError::Io { .. })));
    }

    #[test]
    fn test_empty_list_denies_all() {
        let ac = AccessController::new(AccessList::parse("").unwrap());
        assert!(!ac.permit(ip("127.0.0.1")));
    }

    #[test]
    fn test_pattern_display() {
        assert_eq!("*".parse::<AddressPattern>().unwrap().to_string(), "*");
        assert_eq!(
            "10.0.0.0/8".parse::<AddressPattern>().unwrap().to_string(),
            "10.0.0.0/8"
        );
    }
}
