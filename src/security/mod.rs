//! Security module for dht-shell.
//!
//! Remote shell connections are gated by an access list loaded at
//! startup. When no list is configured, access control is disabled and
//! every remote client is admitted.
//!
//! ## Example
//!
//! ```rust
//! use dht_shell::security::{AccessController, AccessList};
//!
//! let list = AccessList::parse("allow 127.0.0.0/8").unwrap();
//! let ac = AccessController::new(list);
//! assert!(ac.permit("127.0.0.1".parse().unwrap()));
//! assert!(!ac.permit("192.0.2.1".parse().unwrap()));
//! ```

pub mod acl;

pub use acl::{AccessController, AccessList, AclEntry, AclError, AddressPattern, Decision};
