//! # LDAP Transport
//!
//! LDAP/Active Directory transport for `xdomain-connector`, built on `ldap3`.
//!
//! ## Features
//!
//! - Plain LDAP, LDAPS and STARTTLS
//! - Global catalog and partition endpoints
//! - Simple binds; Kerberos/Negotiate binds with the `gssapi` feature
//! - Nested membership tests evaluated by the server
//!   (`LDAP_MATCHING_RULE_IN_CHAIN`)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use xdomain_connector::prelude::*;
//! use xdomain_connector_ldap::LdapTransport;
//!
//! let config = DirectoryConfig::from_json_file("directory.json")?;
//! let flow = CrossPartitionMembership::from_config(config, Arc::new(LdapTransport::new()))?;
//! ```

pub mod connector;

// Re-exports
pub use connector::{LdapConnection, LdapTransport, MATCHING_RULE_IN_CHAIN};
