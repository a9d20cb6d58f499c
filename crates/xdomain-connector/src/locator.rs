//! Principal lookup through the global catalog
//!
//! A principal is located with one equality search on the catalog endpoint,
//! always scoped under a resolved partition root. Absence is a normal outcome
//! (`Ok(None)`); only transport, authentication and ambiguity failures are
//! errors.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::AmbiguityPolicy;
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{DirectoryEntry, Filter, SearchRequest};
use crate::traits::{release, DirectoryConnection, DirectoryTransport};
use crate::types::{DirectoryEndpoint, DistinguishedName};

/// Attributes read for a located principal.
pub const PRINCIPAL_ATTRIBUTES: &[&str] = &[
    "sAMAccountName",
    "userPrincipalName",
    "distinguishedName",
    "displayName",
];

/// The identity predicate a principal is searched by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AccountName {
    /// Pre-Windows 2000 logon name (`sAMAccountName`).
    Sam(String),
    /// User principal name (`userPrincipalName`).
    Upn(String),
}

impl AccountName {
    /// Classify a raw account name: anything containing `@` is a UPN.
    pub fn parse(value: &str) -> DirectoryResult<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DirectoryError::invalid_configuration(
                "account name is required",
            ));
        }
        if value.contains('@') {
            Ok(AccountName::Upn(value.to_string()))
        } else {
            Ok(AccountName::Sam(value.to_string()))
        }
    }

    /// Directory attribute matched by this predicate.
    pub fn attribute(&self) -> &'static str {
        match self {
            AccountName::Sam(_) => "sAMAccountName",
            AccountName::Upn(_) => "userPrincipalName",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            AccountName::Sam(v) | AccountName::Upn(v) => v,
        }
    }

    /// `(&(objectClass=user)(!(objectClass=computer))(<attribute>=<value>))`.
    ///
    /// Computer accounts also carry `objectClass=user` and are excluded.
    pub fn filter(&self) -> Filter {
        Filter::and(vec![
            Filter::eq("objectClass", "user"),
            Filter::negate(Filter::eq("objectClass", "computer")),
            Filter::eq(self.attribute(), self.value()),
        ])
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// A resolved user object.
#[derive(Debug, Clone)]
pub struct Principal {
    account_name: String,
    distinguished_name: DistinguishedName,
    entry: DirectoryEntry,
}

impl Principal {
    /// Build a principal from a directory entry.
    ///
    /// Fails when the entry's DN does not parse.
    pub fn from_entry(account: &AccountName, entry: DirectoryEntry) -> DirectoryResult<Self> {
        let distinguished_name = DistinguishedName::parse(entry.dn.clone())?;
        let account_name = entry
            .first("sAMAccountName")
            .unwrap_or(account.value())
            .to_string();

        Ok(Self {
            account_name,
            distinguished_name,
            entry,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn distinguished_name(&self) -> &DistinguishedName {
        &self.distinguished_name
    }

    /// The underlying directory entry.
    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    /// The path the directory knows this principal by, used as the member
    /// reference in group mutations.
    ///
    /// Taken from the object's own `distinguishedName` attribute when the
    /// server returned one, otherwise from the search result DN. `None` when
    /// the attribute is present but malformed.
    pub fn native_path(&self) -> Option<DistinguishedName> {
        match self.entry.first("distinguishedName") {
            Some(value) => DistinguishedName::parse(value).ok(),
            None => Some(self.distinguished_name.clone()),
        }
    }
}

/// Finds a single principal on a (catalog) endpoint.
pub struct PrincipalLocator<'a> {
    transport: &'a dyn DirectoryTransport,
    policy: AmbiguityPolicy,
}

impl<'a> PrincipalLocator<'a> {
    pub fn new(transport: &'a dyn DirectoryTransport) -> Self {
        Self {
            transport,
            policy: AmbiguityPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Search `endpoint` for the principal matching `account`.
    ///
    /// The endpoint must carry a search root; un-scoped searches fail with
    /// [`DirectoryError::UnscopedSearch`] before any connection is opened.
    #[instrument(skip(self, endpoint, account), fields(host = %endpoint.host(), port = endpoint.port(), account = %account))]
    pub async fn find_principal(
        &self,
        endpoint: &DirectoryEndpoint,
        account: &AccountName,
    ) -> DirectoryResult<Option<Principal>> {
        let root = endpoint.require_search_root()?;

        let size_limit = match self.policy {
            AmbiguityPolicy::FirstMatch => 1,
            // One more than we accept, so a second candidate is visible.
            AmbiguityPolicy::Reject => 2,
        };
        let request = SearchRequest::new(root.clone(), account.filter())
            .with_scope(endpoint.scope())
            .with_attributes(PRINCIPAL_ATTRIBUTES)
            .with_size_limit(size_limit);

        let mut connection = self.transport.connect(endpoint).await?;
        let result = self.locate(connection.as_mut(), &request, root, account).await;
        release(connection).await;

        if let Ok(Some(principal)) = &result {
            info!(dn = %principal.distinguished_name(), "Principal located");
        }
        result
    }

    async fn locate(
        &self,
        connection: &mut dyn DirectoryConnection,
        request: &SearchRequest,
        root: &DistinguishedName,
        account: &AccountName,
    ) -> DirectoryResult<Option<Principal>> {
        let entries = connection.search(request).await?;
        let returned = entries.len();

        let mut candidates: Vec<Principal> = entries
            .into_iter()
            .filter_map(|entry| match Principal::from_entry(account, entry) {
                Ok(principal) if principal.distinguished_name().is_within(root) => Some(principal),
                Ok(principal) => {
                    warn!(
                        dn = %principal.distinguished_name(),
                        root = %root,
                        "Discarding search result outside the search root"
                    );
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Discarding search result with an unusable DN");
                    None
                }
            })
            .collect();

        debug!(returned, kept = candidates.len(), "Principal search completed");

        if candidates.len() > 1 && self.policy == AmbiguityPolicy::Reject {
            return Err(DirectoryError::MultipleMatches {
                attribute: account.attribute().to_string(),
                value: account.value().to_string(),
            });
        }

        if candidates.is_empty() {
            Ok(None)
        } else {
            Ok(Some(candidates.swap_remove(0)))
        }
    }
}
