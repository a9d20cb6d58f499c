//! Directory configuration
//!
//! The configuration structure consumed by the endpoint resolver, and the
//! [`CredentialsProvider`] seam through which it is consulted. Nothing here is
//! process-global: a `DirectoryConfig` is built or loaded by the caller and
//! passed in explicitly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};
use crate::types::BindMethod;

/// Transport timeouts. Unset values leave the transport's own behavior alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connect timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_secs: Option<u64>,

    /// Per-operation timeout in seconds (bind, search, modify).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_secs: Option<u64>,
}

impl ConnectionSettings {
    /// Set the connect timeout.
    #[must_use]
    pub fn with_connection_timeout(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = Some(secs);
        self
    }

    /// Set the operation timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, secs: u64) -> Self {
        self.operation_timeout_secs = Some(secs);
        self
    }

    /// Get connect timeout as Duration.
    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout_secs.map(Duration::from_secs)
    }

    /// Get operation timeout as Duration.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

/// What the principal locator does when an account predicate matches more
/// than one object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Fail with [`DirectoryError::MultipleMatches`].
    #[default]
    Reject,
    /// Keep the first entry the server returns.
    FirstMatch,
}

/// Global catalog location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalCatalogConfig {
    /// Domain controller hosting the global catalog (e.g., "dc1.domain.com").
    pub host: String,

    /// Catalog port; 3268, or 3269 with SSL, when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Per-partition overrides.
#[derive(Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// DNS name of the partition (e.g., "child.domain.com").
    pub name: String,

    /// Domain controller to bind to instead of the partition's DNS name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Bind principal used for this partition instead of the default one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_principal: Option<String>,

    /// Bind password used for this partition instead of the default one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,
}

impl PartitionConfig {
    /// Create an override entry for a partition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
            bind_principal: None,
            bind_password: None,
        }
    }

    /// Bind to a specific domain controller.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Bind with partition-specific credentials.
    pub fn with_credentials(
        mut self,
        principal: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.bind_principal = Some(principal.into());
        self.bind_password = Some(password.into());
        self
    }
}

impl std::fmt::Debug for PartitionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("bind_principal", &self.bind_principal)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .finish()
    }
}

/// Connection parameters supplied for one partition.
#[derive(Clone)]
pub struct PartitionCredentials {
    /// Bind principal name.
    pub principal_name: String,
    /// Bind secret. Never logged.
    pub secret: Option<String>,
    /// Global catalog host.
    pub catalog_host: String,
    /// Global catalog port, if not the well-known one.
    pub catalog_port: Option<u16>,
    /// Domain controller for partition binds; the partition name when unset.
    pub partition_host: Option<String>,
    pub bind_method: BindMethod,
    pub use_ssl: bool,
    pub use_starttls: bool,
    pub connection: ConnectionSettings,
}

impl std::fmt::Debug for PartitionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCredentials")
            .field("principal_name", &self.principal_name)
            .field("secret", &self.secret.as_ref().map(|_| "***REDACTED***"))
            .field("catalog_host", &self.catalog_host)
            .field("catalog_port", &self.catalog_port)
            .field("partition_host", &self.partition_host)
            .field("bind_method", &self.bind_method)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("connection", &self.connection)
            .finish()
    }
}

/// Source of connection parameters for a partition.
pub trait CredentialsProvider: Send + Sync {
    /// Connection parameters for `partition`.
    fn credentials(&self, partition: &str) -> DirectoryResult<PartitionCredentials>;
}

/// Configuration for the directory forest being operated on.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Default bind principal (e.g., "domain\\Administrator").
    pub bind_principal: String,

    /// Default bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Bind method for every connection.
    #[serde(default)]
    pub bind_method: BindMethod,

    /// Global catalog location.
    pub global_catalog: GlobalCatalogConfig,

    /// Use SSL/TLS (LDAPS, or GC over 3269).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain connections.
    #[serde(default)]
    pub use_starttls: bool,

    /// Connect and operation timeouts.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Partition-specific overrides.
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,

    /// How ambiguous account lookups are handled.
    #[serde(default)]
    pub ambiguity_policy: AmbiguityPolicy,
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("bind_principal", &self.bind_principal)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("bind_method", &self.bind_method)
            .field("global_catalog", &self.global_catalog)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("connection", &self.connection)
            .field("partitions", &self.partitions)
            .field("ambiguity_policy", &self.ambiguity_policy)
            .finish()
    }
}

impl DirectoryConfig {
    /// Create a config with required fields.
    pub fn new(bind_principal: impl Into<String>, catalog_host: impl Into<String>) -> Self {
        Self {
            bind_principal: bind_principal.into(),
            bind_password: None,
            bind_method: BindMethod::Simple,
            global_catalog: GlobalCatalogConfig {
                host: catalog_host.into(),
                port: None,
            },
            use_ssl: false,
            use_starttls: false,
            connection: ConnectionSettings::default(),
            partitions: Vec::new(),
            ambiguity_policy: AmbiguityPolicy::default(),
        }
    }

    /// Load a config from a JSON string and validate it.
    pub fn from_json_str(json: &str) -> DirectoryResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DirectoryError::Serialization {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DirectoryError::invalid_configuration(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Use a non-default global catalog port.
    #[must_use]
    pub fn with_catalog_port(mut self, port: u16) -> Self {
        self.global_catalog.port = Some(port);
        self
    }

    /// Enable SSL (LDAPS / GC over SSL).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
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

    /// Add a partition override.
    #[must_use]
    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partitions.push(partition);
        self
    }

    /// Set the ambiguity policy.
    #[must_use]
    pub fn with_ambiguity_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity_policy = policy;
        self
    }

    /// Look up the override entry for a partition (case-insensitive).
    pub fn partition(&self, name: &str) -> Option<&PartitionConfig> {
        self.partitions
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Validate the configuration.
    ///
    /// Simple binds need the default principal and password unless every
    /// partition override carries its own pair. A partition override must set
    /// its principal and password together.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.global_catalog.host.trim().is_empty() {
            return Err(DirectoryError::invalid_configuration(
                "global_catalog.host is required",
            ));
        }

        if self.global_catalog.port == Some(0) {
            return Err(DirectoryError::invalid_configuration(
                "global_catalog.port must not be 0",
            ));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        let simple = self.bind_method == BindMethod::Simple;
        let defaults_used =
            self.partitions.is_empty() || self.partitions.iter().any(|p| p.bind_principal.is_none());

        if simple && defaults_used {
            if self.bind_principal.trim().is_empty() {
                return Err(DirectoryError::invalid_configuration(
                    "bind_principal is required for simple binds",
                ));
            }
            if self.bind_password.is_none() {
                return Err(DirectoryError::invalid_configuration(
                    "bind_password is required for simple binds",
                ));
            }
        }

        for (i, partition) in self.partitions.iter().enumerate() {
            if partition.name.trim().is_empty() {
                return Err(DirectoryError::invalid_configuration(format!(
                    "partitions[{}].name cannot be empty",
                    i
                )));
            }
            if self.partitions[..i]
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(&partition.name))
            {
                return Err(DirectoryError::invalid_configuration(format!(
                    "partition '{}' is configured more than once",
                    partition.name
                )));
            }
            match (&partition.bind_principal, &partition.bind_password) {
                (None, Some(_)) => {
                    return Err(DirectoryError::invalid_configuration(format!(
                        "partition '{}' sets bind_password without bind_principal",
                        partition.name
                    )))
                }
                (Some(principal), None) if simple => {
                    return Err(DirectoryError::invalid_configuration(format!(
                        "partition '{}' sets bind_principal '{}' without bind_password",
                        partition.name, principal
                    )))
                }
                (Some(principal), _) if simple && principal.trim().is_empty() => {
                    return Err(DirectoryError::invalid_configuration(format!(
                        "partitions[{}].bind_principal cannot be empty",
                        i
                    )))
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Create a redacted version of this config (for logging/display).
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        for partition in &mut config.partitions {
            if partition.bind_password.is_some() {
                partition.bind_password = Some("***REDACTED***".to_string());
            }
        }
        config
    }
}

impl CredentialsProvider for DirectoryConfig {
    fn credentials(&self, partition: &str) -> DirectoryResult<PartitionCredentials> {
        let overrides = self.partition(partition);

        // The override principal never borrows the default password.
        let (principal_name, secret) =
            match overrides.and_then(|p| p.bind_principal.clone().map(|name| (name, p))) {
                Some((name, p)) => (name, p.bind_password.clone()),
                None => (self.bind_principal.clone(), self.bind_password.clone()),
            };

        Ok(PartitionCredentials {
            principal_name,
            secret,
            catalog_host: self.global_catalog.host.clone(),
            catalog_port: self.global_catalog.port,
            partition_host: overrides.and_then(|p| p.host.clone()),
            bind_method: self.bind_method,
            use_ssl: self.use_ssl,
            use_starttls: self.use_starttls,
            connection: self.connection.clone(),
        })
    }
}
