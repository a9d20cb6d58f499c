//! Group membership management
//!
//! Finds a group inside a partition, tests whether a principal already belongs
//! to it and adds the principal only when it does not. Membership is never
//! cached: each call asks the directory, so a repeated call observes the result
//! of the previous one and becomes a no-op.
//!
//! The steps are not transactional. A failure between the membership test and
//! the commit leaves the group unchanged, and re-running is always safe.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{DirectoryError, DirectoryResult};
use crate::locator::Principal;
use crate::operation::{DirectoryEntry, Filter, SearchRequest};
use crate::traits::{release, DirectoryConnection, DirectoryTransport};
use crate::types::{DirectoryEndpoint, DistinguishedName, ScopeMode};

/// Attributes read for a located group.
pub const GROUP_ATTRIBUTES: &[&str] = &["name", "distinguishedName", "groupType"];

/// Terminal outcome of a membership request that reached the directory.
///
/// Transport and authentication failures are the `Err` arm of the surrounding
/// [`DirectoryResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipResult {
    /// The member reference was added and committed.
    Committed,
    /// The principal already belonged to the group; nothing was changed.
    AlreadyMember,
    /// No group with the requested name exists under the partition root.
    GroupNotFound,
    /// The principal's directory path could not be derived.
    PrincipalUnresolvable,
}

impl MembershipResult {
    /// Whether the principal is a member of the group after the call.
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            MembershipResult::Committed | MembershipResult::AlreadyMember
        )
    }
}

impl fmt::Display for MembershipResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MembershipResult::Committed => "member added",
            MembershipResult::AlreadyMember => "already a member",
            MembershipResult::GroupNotFound => "group not found",
            MembershipResult::PrincipalUnresolvable => "principal path could not be resolved",
        };
        f.write_str(text)
    }
}

/// A group object located in a partition.
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    distinguished_name: DistinguishedName,
    entry: DirectoryEntry,
}

impl Group {
    /// Build a group from a directory entry.
    pub fn from_entry(name: &str, entry: DirectoryEntry) -> DirectoryResult<Self> {
        let distinguished_name = DistinguishedName::parse(entry.dn.clone())?;
        let name = entry.first("name").unwrap_or(name).to_string();
        Ok(Self {
            name,
            distinguished_name,
            entry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn distinguished_name(&self) -> &DistinguishedName {
        &self.distinguished_name
    }

    /// The underlying directory entry.
    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }
}

/// Outcome of [`GroupHandle::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// Staged references were written.
    Committed,
    /// Nothing was staged.
    NothingToCommit,
    /// The directory reported a staged reference as already present.
    AlreadyPresent,
}

/// Membership capabilities of a located group, bound to an open connection.
///
/// `add_member` only stages a reference; `commit` writes every staged
/// reference in one modify.
pub struct GroupHandle<'c> {
    group: Group,
    connection: &'c mut dyn DirectoryConnection,
    pending: Vec<DistinguishedName>,
}

impl<'c> GroupHandle<'c> {
    pub fn new(group: Group, connection: &'c mut dyn DirectoryConnection) -> Self {
        Self {
            group,
            connection,
            pending: Vec::new(),
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    /// References staged but not yet committed.
    pub fn pending(&self) -> &[DistinguishedName] {
        &self.pending
    }

    /// Ask the directory whether `path` is a (possibly nested) member.
    pub async fn is_member(&mut self, path: &DistinguishedName) -> DirectoryResult<bool> {
        self.connection
            .is_member(self.group.distinguished_name(), path)
            .await
    }

    /// Stage `path` for addition.
    ///
    /// A group cannot contain itself; staging the same path twice is a no-op.
    pub fn add_member(&mut self, path: DistinguishedName) -> DirectoryResult<()> {
        if path.same_as(self.group.distinguished_name()) {
            return Err(DirectoryError::operation_failed(format!(
                "group '{}' cannot be a member of itself",
                self.group.name
            )));
        }
        if !self.pending.iter().any(|p| p.same_as(&path)) {
            self.pending.push(path);
        }
        Ok(())
    }

    /// Write staged references.
    ///
    /// The staging list is cleared whether or not the write succeeds.
    pub async fn commit(&mut self) -> DirectoryResult<CommitStatus> {
        if self.pending.is_empty() {
            return Ok(CommitStatus::NothingToCommit);
        }

        let members = std::mem::take(&mut self.pending);
        match self
            .connection
            .add_members(self.group.distinguished_name(), &members)
            .await
        {
            Ok(()) => Ok(CommitStatus::Committed),
            Err(DirectoryError::ObjectAlreadyExists { identifier }) => {
                debug!(group = %identifier, "Member reference already present at commit");
                Ok(CommitStatus::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }
}

/// Adds principals to groups of one partition, idempotently.
pub struct GroupMembershipManager<'a> {
    transport: &'a dyn DirectoryTransport,
    endpoint: &'a DirectoryEndpoint,
}

impl<'a> GroupMembershipManager<'a> {
    /// `endpoint` is the partition's own (non-catalog) endpoint; the global
    /// catalog is read-only and cannot take the mutation.
    pub fn new(transport: &'a dyn DirectoryTransport, endpoint: &'a DirectoryEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    /// Make `principal` a member of the group named `group_name` under
    /// `partition_root`, unless it already is one.
    #[instrument(skip(self, principal, partition_root), fields(principal = %principal.distinguished_name(), root = %partition_root))]
    pub async fn ensure_member(
        &self,
        principal: &Principal,
        partition_root: &DistinguishedName,
        group_name: &str,
    ) -> DirectoryResult<MembershipResult> {
        let endpoint = self
            .endpoint
            .clone()
            .with_search_root(partition_root.clone())
            .with_scope(ScopeMode::Subtree);

        let mut connection = self.transport.connect(&endpoint).await?;
        let result = Self::ensure_on(connection.as_mut(), &endpoint, principal, group_name).await;
        release(connection).await;

        Self::log_outcome(&result, group_name);
        result
    }

    /// Add `member_dn` to the group at `group_dn`, unless it is already a
    /// member.
    #[instrument(skip(self))]
    pub async fn add_member_by_dn(
        &self,
        group_dn: &DistinguishedName,
        member_dn: &DistinguishedName,
    ) -> DirectoryResult<MembershipResult> {
        let endpoint = self
            .endpoint
            .clone()
            .with_search_root(group_dn.clone())
            .with_scope(ScopeMode::Base);

        let mut connection = self.transport.connect(&endpoint).await?;
        let result = Self::add_on(connection.as_mut(), &endpoint, member_dn).await;
        release(connection).await;

        Self::log_outcome(&result, group_dn.as_str());
        result
    }

    async fn ensure_on(
        connection: &mut dyn DirectoryConnection,
        endpoint: &DirectoryEndpoint,
        principal: &Principal,
        group_name: &str,
    ) -> DirectoryResult<MembershipResult> {
        let filter = Filter::object_with("group", "name", group_name);
        let Some(group) = Self::find_group(connection, endpoint, filter, group_name).await? else {
            return Ok(MembershipResult::GroupNotFound);
        };

        let Some(path) = principal.native_path() else {
            warn!(
                account = %principal.account_name(),
                "Principal has no usable directory path"
            );
            return Ok(MembershipResult::PrincipalUnresolvable);
        };

        Self::apply(GroupHandle::new(group, connection), path).await
    }

    async fn add_on(
        connection: &mut dyn DirectoryConnection,
        endpoint: &DirectoryEndpoint,
        member_dn: &DistinguishedName,
    ) -> DirectoryResult<MembershipResult> {
        let group_dn = endpoint.require_search_root()?;
        let filter = Filter::eq("objectClass", "group");
        let Some(group) = Self::find_group(connection, endpoint, filter, group_dn.as_str()).await?
        else {
            return Ok(MembershipResult::GroupNotFound);
        };

        Self::apply(GroupHandle::new(group, connection), member_dn.clone()).await
    }

    async fn find_group(
        connection: &mut dyn DirectoryConnection,
        endpoint: &DirectoryEndpoint,
        filter: Filter,
        group_name: &str,
    ) -> DirectoryResult<Option<Group>> {
        let request = SearchRequest::new(endpoint.require_search_root()?.clone(), filter)
            .with_scope(endpoint.scope())
            .with_attributes(GROUP_ATTRIBUTES)
            .with_size_limit(1);

        let entries = connection.search(&request).await?;
        let group = entries
            .into_iter()
            .find_map(|entry| match Group::from_entry(group_name, entry) {
                Ok(group) => Some(group),
                Err(e) => {
                    warn!(error = %e, "Discarding group entry with an unusable DN");
                    None
                }
            });

        if let Some(group) = &group {
            debug!(group = %group.distinguished_name(), "Group located");
        }
        Ok(group)
    }

    async fn apply(
        mut handle: GroupHandle<'_>,
        path: DistinguishedName,
    ) -> DirectoryResult<MembershipResult> {
        if handle.is_member(&path).await? {
            return Ok(MembershipResult::AlreadyMember);
        }

        handle.add_member(path)?;
        match handle.commit().await? {
            CommitStatus::Committed => Ok(MembershipResult::Committed),
            CommitStatus::AlreadyPresent | CommitStatus::NothingToCommit => {
                Ok(MembershipResult::AlreadyMember)
            }
        }
    }

    fn log_outcome(result: &DirectoryResult<MembershipResult>, group: &str) {
        match result {
            Ok(MembershipResult::Committed) => info!(group = %group, "Member added to group"),
            Ok(outcome) => info!(group = %group, outcome = %outcome, "Group left unchanged"),
            Err(e) => warn!(group = %group, error = %e, "Membership update failed"),
        }
    }
}
