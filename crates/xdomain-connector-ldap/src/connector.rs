//! LDAP transport implementation
//!
//! Implements the directory transport traits for LDAP/Active Directory.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, ResultEntry, Scope,
    SearchEntry, SearchOptions, SearchResult,
};
use tracing::{debug, info, instrument, warn};

use xdomain_connector::error::{DirectoryError, DirectoryResult};
use xdomain_connector::operation::{DirectoryEntry, Filter, SearchRequest};
use xdomain_connector::traits::{DirectoryConnection, DirectoryTransport};
use xdomain_connector::types::{BindMethod, DirectoryEndpoint, DistinguishedName, ScopeMode};

/// `LDAP_MATCHING_RULE_IN_CHAIN`: matches through nested group membership.
pub const MATCHING_RULE_IN_CHAIN: &str = "1.2.840.113556.1.4.1941";

const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS: u32 = 50;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// Opens bound `ldap3` connections.
///
/// Holds no state: each [`DirectoryTransport::connect`] call opens a fresh
/// connection which the caller releases when its operation is done.
#[derive(Debug, Clone, Default)]
pub struct LdapTransport;

impl LdapTransport {
    pub fn new() -> Self {
        Self
    }

    fn settings(endpoint: &DirectoryEndpoint) -> LdapConnSettings {
        let settings = LdapConnSettings::new().set_starttls(endpoint.use_starttls());
        match endpoint.connection().connection_timeout() {
            Some(timeout) => settings.set_conn_timeout(timeout),
            None => settings,
        }
    }
}

#[async_trait]
impl DirectoryTransport for LdapTransport {
    #[instrument(skip(self, endpoint), fields(url = %endpoint.url(), partition = %endpoint.partition()))]
    async fn connect(
        &self,
        endpoint: &DirectoryEndpoint,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        let url = endpoint.url();
        debug!("Connecting to directory server");

        let (conn, ldap) = LdapConnAsync::with_settings(Self::settings(endpoint), &url)
            .await
            .map_err(|e| match e {
                LdapError::Timeout { .. } => DirectoryError::ConnectionTimeout {
                    timeout_secs: endpoint
                        .connection()
                        .connection_timeout_secs
                        .unwrap_or_default(),
                },
                e => DirectoryError::connection_failed_with_source(
                    format!("Failed to connect to directory server at {url}"),
                    e,
                ),
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let mut connection = LdapConnection {
            ldap,
            operation_timeout: endpoint.connection().operation_timeout(),
        };

        if let Err(e) = connection.bind(endpoint).await {
            if let Err(unbind) = connection.ldap.unbind().await {
                warn!(error = %unbind, "Error during LDAP unbind after failed bind");
            }
            return Err(e);
        }

        info!(host = %endpoint.host(), port = endpoint.port(), "Directory connection established");
        Ok(Box::new(connection))
    }
}

/// A bound `ldap3` connection.
pub struct LdapConnection {
    ldap: Ldap,
    operation_timeout: Option<Duration>,
}

impl LdapConnection {
    /// The handle for the next operation, with the operation timeout applied.
    fn ldap(&mut self) -> &mut Ldap {
        if let Some(timeout) = self.operation_timeout {
            self.ldap.with_timeout(timeout);
        }
        &mut self.ldap
    }

    fn timeout_secs(&self) -> u64 {
        self.operation_timeout.map_or(0, |t| t.as_secs())
    }

    async fn bind(&mut self, endpoint: &DirectoryEndpoint) -> DirectoryResult<()> {
        let credentials = endpoint.credentials();
        let timeout_secs = self.timeout_secs();

        let result = match endpoint.bind_method() {
            BindMethod::Simple => {
                debug!(principal = %credentials.principal, "Performing simple bind");
                let secret = credentials.secret.as_deref().unwrap_or("");
                self.ldap()
                    .simple_bind(&credentials.principal, secret)
                    .await
                    .map_err(|e| map_ldap_error("bind", timeout_secs, e))?
            }
            BindMethod::Negotiate => {
                debug!(host = %endpoint.host(), "Performing negotiate bind");
                self.negotiate_bind(endpoint.host()).await?
            }
        };

        match result.rc {
            RC_SUCCESS => Ok(()),
            RC_INVALID_CREDENTIALS => Err(DirectoryError::AuthenticationFailed {
                principal: credentials.principal.clone(),
            }),
            rc => Err(DirectoryError::connection_failed(format!(
                "bind failed with code {}: {}",
                rc, result.text
            ))),
        }
    }

    #[cfg(feature = "gssapi")]
    async fn negotiate_bind(&mut self, host: &str) -> DirectoryResult<LdapResult> {
        let timeout_secs = self.timeout_secs();
        self.ldap()
            .sasl_gssapi_bind(host)
            .await
            .map_err(|e| map_ldap_error("bind", timeout_secs, e))
    }

    #[cfg(not(feature = "gssapi"))]
    async fn negotiate_bind(&mut self, _host: &str) -> DirectoryResult<LdapResult> {
        Err(DirectoryError::invalid_configuration(
            "negotiate binds require the `gssapi` feature",
        ))
    }
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn read_root(&mut self, attributes: &[&str]) -> DirectoryResult<Option<DirectoryEntry>> {
        let timeout_secs = self.timeout_secs();
        let SearchResult(entries, result) = self
            .ldap()
            .search("", Scope::Base, "(objectClass=*)", attributes.to_vec())
            .await
            .map_err(|e| map_ldap_error("root DSE read", timeout_secs, e))?;

        if result.rc != RC_SUCCESS {
            return Err(map_result_code(&result, "root DSE read", "rootDSE"));
        }

        Ok(entries.into_iter().find(|e| !e.is_ref()).map(to_entry))
    }

    #[instrument(skip(self, request), fields(base = %request.base))]
    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        let filter = filter_to_ldap(&request.filter);
        let attributes: Vec<&str> = if request.attributes.is_empty() {
            vec!["*"]
        } else {
            request.attributes.iter().map(String::as_str).collect()
        };
        let timeout_secs = self.timeout_secs();

        debug!(filter = %filter, size_limit = ?request.size_limit, "Searching directory");

        let ldap = self.ldap();
        if let Some(limit) = request.size_limit {
            ldap.with_search_options(
                SearchOptions::new().sizelimit(i32::try_from(limit).unwrap_or(i32::MAX)),
            );
        }

        let SearchResult(entries, result) = ldap
            .search(
                request.base.as_str(),
                to_scope(request.scope),
                &filter,
                attributes,
            )
            .await
            .map_err(|e| map_ldap_error("search", timeout_secs, e))?;

        match result.rc {
            RC_SUCCESS | RC_SIZE_LIMIT_EXCEEDED => {}
            RC_NO_SUCH_OBJECT => {
                debug!("Search base does not exist");
                return Ok(Vec::new());
            }
            _ => return Err(map_result_code(&result, "search", request.base.as_str())),
        }

        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .filter(|e| !e.is_ref())
            .map(to_entry)
            .collect();
        debug!(returned = entries.len(), "Search completed");
        Ok(entries)
    }

    #[instrument(skip(self), fields(group = %group, member = %member))]
    async fn is_member(
        &mut self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<bool> {
        let filter = membership_filter(member);
        let timeout_secs = self.timeout_secs();

        let SearchResult(entries, result) = self
            .ldap()
            .search(group.as_str(), Scope::Base, &filter, vec!["1.1"])
            .await
            .map_err(|e| map_ldap_error("membership test", timeout_secs, e))?;

        if result.rc != RC_SUCCESS {
            return Err(map_result_code(&result, "membership test", group.as_str()));
        }

        let is_member = entries.iter().any(|e| !e.is_ref());
        debug!(is_member, "Membership test completed");
        Ok(is_member)
    }

    #[instrument(skip(self, members), fields(group = %group, count = members.len()))]
    async fn add_members(
        &mut self,
        group: &DistinguishedName,
        members: &[DistinguishedName],
    ) -> DirectoryResult<()> {
        let values: HashSet<&str> = members.iter().map(DistinguishedName::as_str).collect();
        let timeout_secs = self.timeout_secs();

        let result = self
            .ldap()
            .modify(group.as_str(), vec![Mod::Add("member", values)])
            .await
            .map_err(|e| map_ldap_error("modify", timeout_secs, e))?;

        if result.rc != RC_SUCCESS {
            return Err(map_result_code(&result, "modify", group.as_str()));
        }

        debug!("Member references committed");
        Ok(())
    }

    async fn close(self: Box<Self>) -> DirectoryResult<()> {
        let mut ldap = self.ldap;
        ldap.unbind()
            .await
            .map_err(|e| DirectoryError::connection_failed_with_source("LDAP unbind failed", e))
    }
}

/// Convert a structured filter to an LDAP filter string (RFC 4515).
pub fn filter_to_ldap(filter: &Filter) -> String {
    match filter {
        Filter::And { filters } => {
            let inner: Vec<String> = filters.iter().map(filter_to_ldap).collect();
            format!("(&{})", inner.join(""))
        }
        Filter::Not { filter } => format!("(!{})", filter_to_ldap(filter)),
        Filter::Equals { attribute, value } => {
            format!("({}={})", attribute, escape_ldap_value(value))
        }
    }
}

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_ldap_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// `(member:1.2.840.113556.1.4.1941:=<member dn>)`, evaluated against the
/// group object.
fn membership_filter(member: &DistinguishedName) -> String {
    format!(
        "(member:{}:={})",
        MATCHING_RULE_IN_CHAIN,
        escape_ldap_value(member.as_str())
    )
}

fn to_scope(scope: ScopeMode) -> Scope {
    match scope {
        ScopeMode::Base => Scope::Base,
        ScopeMode::OneLevel => Scope::OneLevel,
        ScopeMode::Subtree => Scope::Subtree,
    }
}

fn to_entry(entry: ResultEntry) -> DirectoryEntry {
    let entry = SearchEntry::construct(entry);
    DirectoryEntry {
        dn: entry.dn,
        attributes: entry.attrs.into_iter().collect(),
    }
}

fn map_ldap_error(operation: &str, timeout_secs: u64, error: LdapError) -> DirectoryError {
    match error {
        LdapError::Timeout { .. } => DirectoryError::ConnectionTimeout { timeout_secs },
        e => DirectoryError::connection_failed_with_source(format!("LDAP {operation} failed"), e),
    }
}

/// Map a non-success LDAP result code.
fn map_result_code(result: &LdapResult, operation: &str, target: &str) -> DirectoryError {
    match result.rc {
        RC_ATTRIBUTE_OR_VALUE_EXISTS | RC_ENTRY_ALREADY_EXISTS => {
            DirectoryError::ObjectAlreadyExists {
                identifier: target.to_string(),
            }
        }
        RC_NO_SUCH_OBJECT => DirectoryError::ObjectNotFound {
            identifier: target.to_string(),
        },
        RC_INSUFFICIENT_ACCESS => DirectoryError::AuthorizationFailed {
            operation: format!("{operation} on {target}"),
        },
        rc => DirectoryError::operation_failed(format!(
            "LDAP {operation} on {target} failed with code {rc}: {}",
            result.text
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdomain_connector::error::ErrorCategory;

    fn ldap_result(rc: u32, text: &str) -> LdapResult {
        LdapResult {
            rc,
            matched: String::new(),
            text: text.to_string(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        }
    }

    #[test]
    fn test_filter_to_ldap_equals() {
        let filter = Filter::eq("sAMAccountName", "viksaini");
        assert_eq!(filter_to_ldap(&filter), "(sAMAccountName=viksaini)");
    }

    #[test]
    fn test_filter_to_ldap_group_lookup() {
        let filter = Filter::object_with("group", "name", "Engineers");
        assert_eq!(
            filter_to_ldap(&filter),
            "(&(objectClass=group)(name=Engineers))"
        );
    }

    #[test]
    fn test_filter_to_ldap_not() {
        let filter = Filter::and(vec![
            Filter::eq("objectClass", "user"),
            Filter::negate(Filter::eq("objectClass", "computer")),
        ]);
        assert_eq!(
            filter_to_ldap(&filter),
            "(&(objectClass=user)(!(objectClass=computer)))"
        );
    }

    #[test]
    fn test_escape_ldap_value() {
        assert_eq!(escape_ldap_value("John Doe"), "John Doe");
        assert_eq!(escape_ldap_value("John*"), "John\\2a");
        assert_eq!(escape_ldap_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_ldap_value("a\\b"), "a\\5cb");
        assert_eq!(escape_ldap_value("nul\0"), "nul\\00");
    }

    #[test]
    fn test_filter_injection_is_neutralized() {
        let filter = Filter::eq("name", "*)(objectClass=*");
        assert_eq!(
            filter_to_ldap(&filter),
            "(name=\\2a\\29\\28objectClass=\\2a)"
        );
    }

    #[test]
    fn test_membership_filter_uses_in_chain_rule() {
        let member =
            DistinguishedName::parse("CN=Smith\\, John,OU=Staff,DC=child,DC=domain,DC=com")
                .unwrap();
        assert_eq!(
            membership_filter(&member),
            "(member:1.2.840.113556.1.4.1941:=CN=Smith\\5c, John,OU=Staff,DC=child,DC=domain,DC=com)"
        );
    }

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(to_scope(ScopeMode::Base), Scope::Base));
        assert!(matches!(to_scope(ScopeMode::OneLevel), Scope::OneLevel));
        assert!(matches!(to_scope(ScopeMode::Subtree), Scope::Subtree));
    }

    #[test]
    fn test_result_code_mapping() {
        let group = "CN=Engineers,OU=Groups,DC=child,DC=domain,DC=com";

        for rc in [RC_ATTRIBUTE_OR_VALUE_EXISTS, RC_ENTRY_ALREADY_EXISTS] {
            let err = map_result_code(&ldap_result(rc, ""), "modify", group);
            assert!(matches!(err, DirectoryError::ObjectAlreadyExists { .. }));
            assert_eq!(err.category(), ErrorCategory::Conflict);
        }

        let err = map_result_code(&ldap_result(RC_NO_SUCH_OBJECT, ""), "modify", group);
        assert!(matches!(err, DirectoryError::ObjectNotFound { .. }));

        let err = map_result_code(&ldap_result(RC_INSUFFICIENT_ACCESS, ""), "modify", group);
        assert!(matches!(err, DirectoryError::AuthorizationFailed { .. }));
        assert_eq!(err.category(), ErrorCategory::Connection);

        let err = map_result_code(&ldap_result(53, "unwilling to perform"), "modify", group);
        assert_eq!(err.error_code(), "OPERATION_FAILED");
        assert!(err.to_string().contains("53"));
        assert!(err.to_string().contains("unwilling to perform"));
    }

    #[test]
    fn test_transport_settings_accept_endpoint() {
        use xdomain_connector::config::ConnectionSettings;
        use xdomain_connector::types::BindCredentials;

        let endpoint = DirectoryEndpoint::new(
            "child.domain.com",
            "child.domain.com",
            389,
            BindCredentials::new("domain\\Administrator", "Pass99"),
        )
        .with_starttls(true)
        .with_connection_settings(ConnectionSettings::default().with_connection_timeout(5));

        // Construction only; no network access.
        let _settings = LdapTransport::settings(&endpoint);
        assert_eq!(endpoint.url(), "ldap://child.domain.com:389");
    }
}
