//! Cross-partition membership flow
//!
//! Ties the components together: resolve endpoints, read the partition root,
//! locate the principal through the global catalog scoped to that root, then
//! make it a member of a group in the group's partition. The account and the
//! group share a partition unless the request names a separate one for the
//! account.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::config::{AmbiguityPolicy, CredentialsProvider, DirectoryConfig};
use crate::endpoint::EndpointResolver;
use crate::error::DirectoryResult;
use crate::locator::{AccountName, PrincipalLocator};
use crate::membership::{GroupMembershipManager, MembershipResult};
use crate::root_dn::RootDnResolver;
use crate::traits::DirectoryTransport;
use crate::types::{DistinguishedName, ScopeMode};

/// Which account should join which group, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipRequest {
    /// DNS name of the partition holding the group.
    pub partition: String,
    pub account: AccountName,
    /// Group `name` attribute.
    pub group: String,
    /// DNS name of the partition holding the account, when it differs from
    /// the group's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_partition: Option<String>,
}

impl MembershipRequest {
    pub fn new(
        partition: impl Into<String>,
        account: AccountName,
        group: impl Into<String>,
    ) -> Self {
        Self {
            partition: partition.into(),
            account,
            group: group.into(),
            account_partition: None,
        }
    }

    /// Look the account up in `partition` instead of the group's partition.
    #[must_use]
    pub fn with_account_partition(mut self, partition: impl Into<String>) -> Self {
        self.account_partition = Some(partition.into());
        self
    }

    /// The partition the account is searched in.
    pub fn account_partition(&self) -> &str {
        self.account_partition
            .as_deref()
            .unwrap_or(&self.partition)
    }

    fn spans_partitions(&self) -> bool {
        !self
            .account_partition()
            .trim()
            .eq_ignore_ascii_case(self.partition.trim())
    }
}

/// Result of [`CrossPartitionMembership::add_account_to_group`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// No principal with the account name exists under the partition root.
    PrincipalNotFound { account: String },
    /// The principal was found; the membership step ended this way.
    Membership { result: MembershipResult },
}

impl ProvisionOutcome {
    /// Whether the account is a member of the group after the call.
    pub fn is_member(&self) -> bool {
        match self {
            ProvisionOutcome::PrincipalNotFound { .. } => false,
            ProvisionOutcome::Membership { result } => result.is_member(),
        }
    }
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionOutcome::PrincipalNotFound { account } => {
                write!(f, "principal '{account}' not found")
            }
            ProvisionOutcome::Membership { result } => write!(f, "{result}"),
        }
    }
}

/// Adds accounts to groups, finding them through the global catalog.
pub struct CrossPartitionMembership {
    provider: Arc<dyn CredentialsProvider>,
    transport: Arc<dyn DirectoryTransport>,
    policy: AmbiguityPolicy,
}

impl CrossPartitionMembership {
    pub fn new(
        provider: Arc<dyn CredentialsProvider>,
        transport: Arc<dyn DirectoryTransport>,
    ) -> Self {
        Self {
            provider,
            transport,
            policy: AmbiguityPolicy::default(),
        }
    }

    /// Build from a validated configuration, taking its ambiguity policy.
    pub fn from_config(
        config: DirectoryConfig,
        transport: Arc<dyn DirectoryTransport>,
    ) -> DirectoryResult<Self> {
        config.validate()?;
        let policy = config.ambiguity_policy;
        Ok(Self::new(Arc::new(config), transport).with_policy(policy))
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Make the account a member of the group, unless it already is one.
    ///
    /// Every connection opened along the way is closed before this returns,
    /// whatever the outcome.
    #[instrument(skip(self, request), fields(partition = %request.partition, account_partition = %request.account_partition(), account = %request.account, group = %request.group))]
    pub async fn add_account_to_group(
        &self,
        request: &MembershipRequest,
    ) -> DirectoryResult<ProvisionOutcome> {
        let endpoints = EndpointResolver::new(self.provider.as_ref());
        let transport = self.transport.as_ref();

        let partition_endpoint = endpoints.resolve(&request.partition, false)?;
        let catalog_endpoint = endpoints.resolve(request.account_partition(), true)?;

        let roots = RootDnResolver::new(transport, &endpoints);
        let group_root = roots.resolve_root_dn(&request.partition).await?;
        let account_root = if request.spans_partitions() {
            roots.resolve_root_dn(request.account_partition()).await?
        } else {
            group_root.clone()
        };

        let catalog_endpoint = catalog_endpoint
            .with_search_root(account_root)
            .with_scope(ScopeMode::Subtree);

        let principal = PrincipalLocator::new(transport)
            .with_policy(self.policy)
            .find_principal(&catalog_endpoint, &request.account)
            .await?;

        let Some(principal) = principal else {
            info!("Principal not found under partition root");
            return Ok(ProvisionOutcome::PrincipalNotFound {
                account: request.account.to_string(),
            });
        };

        let result = GroupMembershipManager::new(transport, &partition_endpoint)
            .ensure_member(&principal, &group_root, &request.group)
            .await?;

        Ok(ProvisionOutcome::Membership { result })
    }

    /// Add `member_dn` to the group at `group_dn` in `partition`, unless it is
    /// already a member. No catalog lookup is involved.
    #[instrument(skip(self))]
    pub async fn add_member_by_dn(
        &self,
        partition: &str,
        group_dn: &DistinguishedName,
        member_dn: &DistinguishedName,
    ) -> DirectoryResult<MembershipResult> {
        let endpoints = EndpointResolver::new(self.provider.as_ref());
        let endpoint = endpoints.resolve(partition, false)?;

        GroupMembershipManager::new(self.transport.as_ref(), &endpoint)
            .add_member_by_dn(group_dn, member_dn)
            .await
    }
}
