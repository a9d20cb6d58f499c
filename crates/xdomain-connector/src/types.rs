//! Directory value types
//!
//! Distinguished names, bind credentials and the connection descriptor handed
//! to a [`DirectoryTransport`](crate::traits::DirectoryTransport).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConnectionSettings;
use crate::error::{DirectoryError, DirectoryResult};

/// Standard LDAP port.
pub const LDAP_PORT: u16 = 389;

/// LDAP over TLS port.
pub const LDAPS_PORT: u16 = 636;

/// Global catalog port.
pub const GLOBAL_CATALOG_PORT: u16 = 3268;

/// Global catalog over TLS port.
pub const GLOBAL_CATALOG_SSL_PORT: u16 = 3269;

/// A distinguished name, e.g. `CN=Alice,OU=Staff,DC=child,DC=domain,DC=com`.
///
/// The spelling as given is preserved for the wire. Comparisons between names
/// go through [`DistinguishedName::rdns`], which normalizes case and the
/// whitespace around separators.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName(String);

impl DistinguishedName {
    /// Parse a distinguished name.
    ///
    /// Every comma-separated component must be an `attribute=value` pair.
    /// Backslash-escaped commas and equals signs are part of the value.
    pub fn parse(value: impl Into<String>) -> DirectoryResult<Self> {
        let value = value.into();
        if !is_well_formed(&value) {
            return Err(DirectoryError::InvalidDistinguishedName { value });
        }
        Ok(Self(value.trim().to_string()))
    }

    /// Derive the naming context of a DNS domain name.
    ///
    /// `child.domain.com` becomes `DC=child,DC=domain,DC=com`.
    pub fn from_domain(domain: &str) -> DirectoryResult<Self> {
        let labels: Vec<&str> = domain
            .trim()
            .trim_end_matches('.')
            .split('.')
            .filter(|label| !label.is_empty())
            .collect();

        if labels.is_empty() {
            return Err(DirectoryError::InvalidDistinguishedName {
                value: domain.to_string(),
            });
        }

        let dn = labels
            .iter()
            .map(|label| format!("DC={label}"))
            .collect::<Vec<_>>()
            .join(",");
        Ok(Self(dn))
    }

    /// The name as it is sent to the server.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized relative distinguished names, leaf first.
    pub fn rdns(&self) -> Vec<String> {
        split_unescaped(&self.0, ',')
            .into_iter()
            .map(normalize_rdn)
            .collect()
    }

    /// Whether this name equals `root` or lies somewhere beneath it.
    pub fn is_within(&self, root: &DistinguishedName) -> bool {
        let own = self.rdns();
        let root = root.rdns();
        own.len() >= root.len() && own[own.len() - root.len()..] == root[..]
    }

    /// Case-insensitive equality of two names.
    pub fn same_as(&self, other: &DistinguishedName) -> bool {
        self.rdns() == other.rdns()
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DistinguishedName({:?})", self.0)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(dn: DistinguishedName) -> Self {
        dn.0
    }
}

fn is_well_formed(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty()
        && split_unescaped(trimmed, ',').into_iter().all(|rdn| {
            let mut parts = split_unescaped(rdn, '=').into_iter();
            let attribute = parts.next().unwrap_or_default().trim();
            !attribute.is_empty() && parts.next().is_some()
        })
}

/// Split on `separator`, ignoring backslash-escaped occurrences.
fn split_unescaped(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            c if c == separator => {
                parts.push(&value[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

fn normalize_rdn(rdn: &str) -> String {
    split_unescaped(rdn, '+')
        .into_iter()
        .map(|ava| match ava.split_once('=') {
            Some((attr, value)) => format!(
                "{}={}",
                attr.trim().to_lowercase(),
                value.trim().to_lowercase()
            ),
            None => ava.trim().to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Search scope relative to the search root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// The root object only.
    Base,
    /// Direct children of the root.
    OneLevel,
    /// The root and everything beneath it.
    #[default]
    Subtree,
}

/// How the transport authenticates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindMethod {
    /// Simple bind with principal name and secret.
    #[default]
    Simple,
    /// Negotiate (Kerberos) bind using the process's ticket cache.
    Negotiate,
}

/// Principal name and secret presented at bind time.
#[derive(Clone, PartialEq, Eq)]
pub struct BindCredentials {
    /// Bind principal, e.g. `DOMAIN\svc-membership` or a UPN.
    pub principal: String,
    /// Bind secret. Never logged.
    pub secret: Option<String>,
}

impl BindCredentials {
    /// Create credentials for a principal with a secret.
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: Some(secret.into()),
        }
    }
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindCredentials")
            .field("principal", &self.principal)
            .field("secret", &self.secret.as_ref().map(|_| "***REDACTED***"))
            .finish()
    }
}

/// A concrete connection descriptor.
///
/// Immutable once built: the `with_*` methods consume the endpoint and return a
/// new one, so a scoped endpoint never aliases its unscoped origin.
#[derive(Debug, Clone)]
pub struct DirectoryEndpoint {
    partition: String,
    host: String,
    port: u16,
    use_ssl: bool,
    use_starttls: bool,
    global_catalog: bool,
    search_root: Option<DistinguishedName>,
    scope: ScopeMode,
    credentials: BindCredentials,
    bind_method: BindMethod,
    connection: ConnectionSettings,
}

impl DirectoryEndpoint {
    /// Create an unscoped, plain-LDAP endpoint.
    pub fn new(
        partition: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        credentials: BindCredentials,
    ) -> Self {
        Self {
            partition: partition.into(),
            host: host.into(),
            port,
            use_ssl: false,
            use_starttls: false,
            global_catalog: false,
            search_root: None,
            scope: ScopeMode::default(),
            credentials,
            bind_method: BindMethod::default(),
            connection: ConnectionSettings::default(),
        }
    }

    /// Use LDAPS.
    #[must_use]
    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Upgrade with STARTTLS after connecting.
    #[must_use]
    pub fn with_starttls(mut self, use_starttls: bool) -> Self {
        self.use_starttls = use_starttls;
        self
    }

    /// Mark the endpoint as a global catalog.
    #[must_use]
    pub fn with_global_catalog(mut self, global_catalog: bool) -> Self {
        self.global_catalog = global_catalog;
        self
    }

    /// Scope every search under `root`.
    #[must_use]
    pub fn with_search_root(mut self, root: DistinguishedName) -> Self {
        self.search_root = Some(root);
        self
    }

    /// Set the search scope.
    #[must_use]
    pub fn with_scope(mut self, scope: ScopeMode) -> Self {
        self.scope = scope;
        self
    }

    /// Set the bind method.
    #[must_use]
    pub fn with_bind_method(mut self, bind_method: BindMethod) -> Self {
        self.bind_method = bind_method;
        self
    }

    /// Set connect and operation timeouts.
    #[must_use]
    pub fn with_connection_settings(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    /// Logical partition this endpoint was resolved for.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    pub fn use_starttls(&self) -> bool {
        self.use_starttls
    }

    pub fn is_global_catalog(&self) -> bool {
        self.global_catalog
    }

    pub fn search_root(&self) -> Option<&DistinguishedName> {
        self.search_root.as_ref()
    }

    /// The search root, or [`DirectoryError::UnscopedSearch`] if none was set.
    pub fn require_search_root(&self) -> DirectoryResult<&DistinguishedName> {
        self.search_root
            .as_ref()
            .ok_or_else(|| DirectoryError::UnscopedSearch {
                host: self.host.clone(),
            })
    }

    pub fn scope(&self) -> ScopeMode {
        self.scope
    }

    pub fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    pub fn bind_method(&self) -> BindMethod {
        self.bind_method
    }

    pub fn connection(&self) -> &ConnectionSettings {
        &self.connection
    }

    /// Get the LDAP URL.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
