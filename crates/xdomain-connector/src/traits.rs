//! Directory transport traits
//!
//! The narrow surface the resolvers, the locator and the membership manager
//! need from a directory protocol client. `xdomain-connector-ldap` implements it
//! on top of `ldap3`; tests implement it in memory.

use async_trait::async_trait;
use tracing::warn;

use crate::error::DirectoryResult;
use crate::operation::{DirectoryEntry, SearchRequest};
use crate::types::{DirectoryEndpoint, DistinguishedName};

/// Opens bound connections to directory endpoints.
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    /// Connect to `endpoint` and bind with its credentials.
    ///
    /// A connection that fails to bind is released before the error is
    /// returned; callers only own connections this method hands back.
    async fn connect(
        &self,
        endpoint: &DirectoryEndpoint,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>>;
}

/// A bound connection.
///
/// Every connection returned by [`DirectoryTransport::connect`] must be
/// released with [`DirectoryConnection::close`] on every exit path of the
/// operation that opened it.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Read the server's root object (root DSE).
    ///
    /// Returns `None` when the server exposes no root entry.
    async fn read_root(&mut self, attributes: &[&str]) -> DirectoryResult<Option<DirectoryEntry>>;

    /// Run a search. A base that does not exist yields no entries.
    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>>;

    /// Whether `member` belongs to `group`, directly or through nested groups.
    ///
    /// Evaluated by the directory service, not locally.
    async fn is_member(
        &mut self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<bool>;

    /// Add member references to `group` in a single modify.
    ///
    /// Fails with [`ObjectAlreadyExists`](crate::error::DirectoryError::ObjectAlreadyExists)
    /// when a reference is already present.
    async fn add_members(
        &mut self,
        group: &DistinguishedName,
        members: &[DistinguishedName],
    ) -> DirectoryResult<()>;

    /// Unbind and release the connection.
    async fn close(self: Box<Self>) -> DirectoryResult<()>;
}

/// Close a connection whose owning operation has finished.
///
/// The operation's own result takes precedence, so a failed unbind is logged
/// and swallowed.
pub async fn release(connection: Box<dyn DirectoryConnection>) {
    if let Err(e) = connection.close().await {
        warn!(error = %e, "Error during directory unbind");
    }
}
