//! # Cross-Partition Membership
//!
//! Adds a user account to a group of the directory partition the account
//! lives in, finding the account through the forest's global catalog.
//!
//! ## Architecture
//!
//! Four components, each behind a narrow interface, plus a flow that chains
//! them:
//!
//! - [`EndpointResolver`] - turns a partition name into a connection endpoint
//!   (partition port or global catalog port)
//! - [`RootDnResolver`] - reads the partition's canonical root DN
//! - [`PrincipalLocator`] - finds an account through the catalog, scoped to
//!   the partition root
//! - [`GroupMembershipManager`] - adds the account to a group, idempotently
//! - [`CrossPartitionMembership`] - the end-to-end flow
//!
//! All directory I/O goes through [`DirectoryTransport`] and
//! [`DirectoryConnection`]; `xdomain-connector-ldap` provides the LDAP
//! implementation.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use xdomain_connector::prelude::*;
//! use xdomain_connector_ldap::LdapTransport;
//!
//! let config = DirectoryConfig::new("domain\\Administrator", "DC1.domain.com")
//!     .with_password("secret");
//! let flow = CrossPartitionMembership::from_config(config, Arc::new(LdapTransport::new()))?;
//!
//! let request = MembershipRequest::new(
//!     "child.domain.com",
//!     AccountName::parse("viksaini")?,
//!     "Engineers",
//! );
//! let outcome = flow.add_account_to_group(&request).await?;
//! println!("{outcome}");
//! ```
//!
//! ## Crate Organization
//!
//! - [`error`] - Error type with categories and stable codes
//! - [`types`] - Distinguished names, endpoints, bind parameters
//! - [`config`] - Configuration and the credentials provider trait
//! - [`operation`] - Structured filters, search requests, entries
//! - [`traits`] - Transport and connection traits
//! - [`endpoint`] - Endpoint resolution from partition names
//! - [`root_dn`] - Partition root DN lookup
//! - [`locator`] - Account names and principal lookup
//! - [`membership`] - Groups and idempotent membership updates
//! - [`flow`] - Requests, outcomes and the end-to-end flow

pub mod config;
pub mod endpoint;
pub mod error;
pub mod flow;
pub mod locator;
pub mod membership;
pub mod operation;
pub mod root_dn;
pub mod traits;
pub mod types;

pub use endpoint::EndpointResolver;
pub use flow::CrossPartitionMembership;
pub use locator::PrincipalLocator;
pub use membership::GroupMembershipManager;
pub use root_dn::RootDnResolver;
pub use traits::{DirectoryConnection, DirectoryTransport};

/// Prelude module for convenient imports.
pub mod prelude {
    // Error handling
    pub use crate::error::{DirectoryError, DirectoryResult, ErrorCategory};

    // Types
    pub use crate::types::{
        BindCredentials, BindMethod, DirectoryEndpoint, DistinguishedName, ScopeMode,
    };

    // Configuration
    pub use crate::config::{
        AmbiguityPolicy, ConnectionSettings, CredentialsProvider, DirectoryConfig,
        PartitionConfig, PartitionCredentials,
    };

    // Operations
    pub use crate::operation::{DirectoryEntry, Filter, SearchRequest};

    // Traits
    pub use crate::traits::{release, DirectoryConnection, DirectoryTransport};

    // Components
    pub use crate::endpoint::EndpointResolver;
    pub use crate::flow::{CrossPartitionMembership, MembershipRequest, ProvisionOutcome};
    pub use crate::locator::{AccountName, Principal, PrincipalLocator};
    pub use crate::membership::{
        CommitStatus, Group, GroupHandle, GroupMembershipManager, MembershipResult,
    };
    pub use crate::root_dn::RootDnResolver;
}

// Re-export async_trait for transport implementors
pub use async_trait::async_trait;
