//! Common test utilities for xdomain-connector integration tests.
//!
//! [`InMemoryDirectory`] is a directory forest held in memory. It implements
//! the transport traits, counts every operation and can be told to fail at
//! specific points.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;
use xdomain_connector::prelude::*;

pub const CHILD: &str = "child.domain.com";
pub const CHILD_ROOT: &str = "DC=child,DC=domain,DC=com";
pub const OTHER_ROOT: &str = "DC=other,DC=domain,DC=com";
pub const PARENT: &str = "domain.com";
pub const PARENT_ROOT: &str = "DC=domain,DC=com";
pub const CATALOG_HOST: &str = "DC1.domain.com";

pub const ALICE_DN: &str = "CN=Alice Smith,OU=Staff,DC=child,DC=domain,DC=com";
pub const BOB_DN: &str = "CN=Bob Jones,OU=Staff,DC=child,DC=domain,DC=com";
pub const CAROL_DN: &str = "CN=Carol White,OU=Staff,DC=child,DC=domain,DC=com";
pub const ALICE_OTHER_DN: &str = "CN=Alice Smith,OU=Staff,DC=other,DC=domain,DC=com";
pub const ENGINEERS_DN: &str = "CN=Engineers,OU=Groups,DC=child,DC=domain,DC=com";
pub const VIKRAM_DN: &str = "CN=Vikram,OU=Jersey,DC=domain,DC=com";
pub const PLATFORM_DN: &str = "CN=Platform,OU=Groups,DC=child,DC=domain,DC=com";

/// Install a test subscriber when `RUST_LOG` is set.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

pub fn dn(value: &str) -> DistinguishedName {
    DistinguishedName::parse(value).unwrap()
}

/// Configuration pointing at the in-memory forest.
pub fn test_config() -> DirectoryConfig {
    DirectoryConfig::new("domain\\Administrator", CATALOG_HOST).with_password("Pass99")
}

/// The end-to-end flow over `directory` with [`test_config`].
pub fn flow(directory: &InMemoryDirectory) -> CrossPartitionMembership {
    flow_with(directory, test_config())
}

pub fn flow_with(directory: &InMemoryDirectory, config: DirectoryConfig) -> CrossPartitionMembership {
    CrossPartitionMembership::from_config(config, Arc::new(directory.clone())).unwrap()
}

/// A request for `account` to join `group` in [`CHILD`].
pub fn request(account: &str, group: &str) -> MembershipRequest {
    MembershipRequest::new(CHILD, AccountName::parse(account).unwrap(), group)
}

/// Operation counts observed by an [`InMemoryDirectory`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub opens: usize,
    pub closes: usize,
    pub root_reads: usize,
    pub searches: usize,
    pub membership_tests: usize,
    pub adds: usize,
}

#[derive(Default)]
struct State {
    entries: Vec<DirectoryEntry>,
    members: HashMap<String, Vec<String>>,
    naming_contexts: HashMap<String, String>,
    counters: Counters,
    searches: Vec<SearchRequest>,
    connections: Vec<(String, u16)>,
    fail_connect: bool,
    reject_bind: bool,
    fail_search: bool,
    concurrent_add: bool,
    ignore_search_base: bool,
}

/// A directory forest held in memory.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The forest used by most tests:
    ///
    /// - partition `child.domain.com` rooted at [`CHILD_ROOT`]
    /// - users alice, bob and carol under it, plus a second alice in another
    ///   partition
    /// - group Engineers with bob as a direct member and Platform as a nested
    ///   group; carol is a member of Platform
    pub fn forest() -> Self {
        Self::new()
            .with_naming_context(CHILD, CHILD_ROOT)
            .with_user(ALICE_DN, "alice")
            .with_user(BOB_DN, "bob")
            .with_user(CAROL_DN, "carol")
            .with_user(ALICE_OTHER_DN, "alice")
            .with_group(ENGINEERS_DN, "Engineers")
            .with_group(PLATFORM_DN, "Platform")
            .with_member(ENGINEERS_DN, BOB_DN)
            .with_member(ENGINEERS_DN, PLATFORM_DN)
            .with_member(PLATFORM_DN, CAROL_DN)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // Seeding

    pub fn with_naming_context(self, host: &str, root: &str) -> Self {
        self.state()
            .naming_contexts
            .insert(host.to_ascii_lowercase(), root.to_string());
        self
    }

    pub fn with_entry(self, entry: DirectoryEntry) -> Self {
        self.state().entries.push(entry);
        self
    }

    /// Add a user object; its UPN is `sam@<dns name of its partition>`.
    pub fn with_user(self, dn: &str, sam: &str) -> Self {
        let entry = DirectoryEntry::new(dn)
            .with("objectClass", "top")
            .with("objectClass", "person")
            .with("objectClass", "user")
            .with("distinguishedName", dn)
            .with("sAMAccountName", sam)
            .with("userPrincipalName", format!("{sam}@{}", dns_name(dn)));
        self.with_entry(entry)
    }

    pub fn with_computer(self, dn: &str, sam: &str) -> Self {
        let entry = DirectoryEntry::new(dn)
            .with("objectClass", "top")
            .with("objectClass", "user")
            .with("objectClass", "computer")
            .with("distinguishedName", dn)
            .with("sAMAccountName", sam);
        self.with_entry(entry)
    }

    pub fn with_group(self, dn: &str, name: &str) -> Self {
        let entry = DirectoryEntry::new(dn)
            .with("objectClass", "top")
            .with("objectClass", "group")
            .with("distinguishedName", dn)
            .with("name", name);
        self.state()
            .members
            .entry(dn.to_ascii_lowercase())
            .or_default();
        self.with_entry(entry)
    }

    pub fn with_member(self, group: &str, member: &str) -> Self {
        self.state()
            .members
            .entry(group.to_ascii_lowercase())
            .or_default()
            .push(member.to_string());
        self
    }

    // Failure injection

    /// Refuse every connection before bind.
    pub fn failing_connect(self) -> Self {
        self.state().fail_connect = true;
        self
    }

    /// Accept the connection, then reject the bind credentials.
    pub fn rejecting_bind(self) -> Self {
        self.state().reject_bind = true;
        self
    }

    /// Bind normally, then fail every search.
    pub fn failing_search(self) -> Self {
        self.state().fail_search = true;
        self
    }

    /// Another writer adds the member between the membership test and the
    /// commit.
    pub fn with_concurrent_add(self) -> Self {
        self.state().concurrent_add = true;
        self
    }

    /// Return matches from the whole forest regardless of the search base.
    pub fn ignoring_search_base(self) -> Self {
        self.state().ignore_search_base = true;
        self
    }

    // Inspection

    pub fn counters(&self) -> Counters {
        self.state().counters
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.state().searches.clone()
    }

    /// `(host, port)` of every connection attempt that got past connect.
    pub fn connections(&self) -> Vec<(String, u16)> {
        self.state().connections.clone()
    }

    /// Direct members of `group`.
    pub fn members_of(&self, group: &str) -> Vec<String> {
        self.state()
            .members
            .get(&group.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DirectoryTransport for InMemoryDirectory {
    async fn connect(
        &self,
        endpoint: &DirectoryEndpoint,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(DirectoryError::connection_failed(format!(
                "connection refused by {}",
                endpoint.url()
            )));
        }

        state.counters.opens += 1;
        state
            .connections
            .push((endpoint.host().to_string(), endpoint.port()));

        if state.reject_bind {
            state.counters.closes += 1;
            return Err(DirectoryError::AuthenticationFailed {
                principal: endpoint.credentials().principal.clone(),
            });
        }

        Ok(Box::new(InMemoryConnection {
            directory: self.clone(),
            host: endpoint.host().to_ascii_lowercase(),
        }))
    }
}

struct InMemoryConnection {
    directory: InMemoryDirectory,
    host: String,
}

#[async_trait]
impl DirectoryConnection for InMemoryConnection {
    async fn read_root(&mut self, attributes: &[&str]) -> DirectoryResult<Option<DirectoryEntry>> {
        let mut state = self.directory.state();
        state.counters.root_reads += 1;

        let Some(naming_context) = state.naming_contexts.get(&self.host).cloned() else {
            return Ok(None);
        };
        let mut root = DirectoryEntry::new("");
        for attribute in attributes {
            if attribute.eq_ignore_ascii_case("defaultNamingContext") {
                root = root.with(*attribute, naming_context.clone());
            }
        }
        Ok(Some(root))
    }

    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        let mut state = self.directory.state();
        state.counters.searches += 1;
        state.searches.push(request.clone());

        if state.fail_search {
            return Err(DirectoryError::connection_failed(
                "connection reset during search",
            ));
        }

        let ignore_base = state.ignore_search_base;
        let limit = request.size_limit.map_or(usize::MAX, |n| n as usize);
        Ok(state
            .entries
            .iter()
            .filter(|entry| ignore_base || in_scope(entry, &request.base, request.scope))
            .filter(|entry| matches(entry, &request.filter))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn is_member(
        &mut self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<bool> {
        let mut state = self.directory.state();
        state.counters.membership_tests += 1;
        let mut seen = HashSet::new();
        Ok(is_member_of(
            &state.members,
            group.as_str(),
            member.as_str(),
            &mut seen,
        ))
    }

    async fn add_members(
        &mut self,
        group: &DistinguishedName,
        members: &[DistinguishedName],
    ) -> DirectoryResult<()> {
        let mut state = self.directory.state();
        state.counters.adds += 1;
        let concurrent = state.concurrent_add;

        let Some(current) = state.members.get_mut(&group.as_str().to_ascii_lowercase()) else {
            return Err(DirectoryError::ObjectNotFound {
                identifier: group.to_string(),
            });
        };

        if concurrent {
            current.extend(members.iter().map(ToString::to_string));
            return Err(DirectoryError::ObjectAlreadyExists {
                identifier: group.to_string(),
            });
        }

        if members
            .iter()
            .any(|m| current.iter().any(|c| c.eq_ignore_ascii_case(m.as_str())))
        {
            return Err(DirectoryError::ObjectAlreadyExists {
                identifier: group.to_string(),
            });
        }

        current.extend(members.iter().map(ToString::to_string));
        Ok(())
    }

    async fn close(self: Box<Self>) -> DirectoryResult<()> {
        self.directory.state().counters.closes += 1;
        Ok(())
    }
}

fn in_scope(entry: &DirectoryEntry, base: &DistinguishedName, scope: ScopeMode) -> bool {
    let Ok(dn) = DistinguishedName::parse(entry.dn.clone()) else {
        return false;
    };
    match scope {
        ScopeMode::Base => dn.same_as(base),
        ScopeMode::OneLevel => dn.is_within(base) && dn.rdns().len() == base.rdns().len() + 1,
        ScopeMode::Subtree => dn.is_within(base),
    }
}

fn matches(entry: &DirectoryEntry, filter: &Filter) -> bool {
    match filter {
        Filter::Equals { attribute, value } => entry
            .values(attribute)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        Filter::And { filters } => filters.iter().all(|f| matches(entry, f)),
        Filter::Not { filter } => !matches(entry, filter),
    }
}

fn is_member_of(
    members: &HashMap<String, Vec<String>>,
    group: &str,
    member: &str,
    seen: &mut HashSet<String>,
) -> bool {
    let key = group.to_ascii_lowercase();
    if !seen.insert(key.clone()) {
        return false;
    }
    let Some(direct) = members.get(&key) else {
        return false;
    };
    direct
        .iter()
        .any(|m| m.eq_ignore_ascii_case(member) || is_member_of(members, m, member, seen))
}

fn dns_name(dn: &str) -> String {
    dn.split(',')
        .filter_map(|rdn| rdn.trim().split_once('='))
        .filter(|(attr, _)| attr.eq_ignore_ascii_case("DC"))
        .map(|(_, value)| value)
        .collect::<Vec<_>>()
        .join(".")
}
