//! Directory endpoint resolution
//!
//! Turns a partition name into a concrete [`DirectoryEndpoint`]. Partition
//! binds go to the partition's own domain controller on the standard directory
//! port; global catalog binds go to the catalog host on the catalog port, which
//! is what makes a search forest-wide instead of partition-local.

use tracing::debug;

use crate::config::{CredentialsProvider, PartitionCredentials};
use crate::error::{DirectoryError, DirectoryResult};
use crate::types::{
    BindCredentials, BindMethod, DirectoryEndpoint, GLOBAL_CATALOG_PORT, GLOBAL_CATALOG_SSL_PORT,
    LDAPS_PORT, LDAP_PORT,
};

/// Builds endpoints from the parameters a [`CredentialsProvider`] supplies.
///
/// Pure construction: no I/O happens here.
pub struct EndpointResolver<'a> {
    provider: &'a dyn CredentialsProvider,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(provider: &'a dyn CredentialsProvider) -> Self {
        Self { provider }
    }

    /// Resolve the endpoint for `partition`.
    ///
    /// With `use_global_catalog` the endpoint targets the catalog host and port
    /// instead of the partition itself. The returned endpoint is unscoped.
    pub fn resolve(
        &self,
        partition: &str,
        use_global_catalog: bool,
    ) -> DirectoryResult<DirectoryEndpoint> {
        let partition = partition.trim();
        if partition.is_empty() {
            return Err(DirectoryError::invalid_configuration(
                "partition name is required",
            ));
        }

        let creds = self.provider.credentials(partition)?;
        Self::check_credentials(&creds)?;

        let (host, port) = if use_global_catalog {
            Self::catalog_address(&creds)?
        } else {
            let host = creds
                .partition_host
                .clone()
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| partition.to_string());
            let port = if creds.use_ssl { LDAPS_PORT } else { LDAP_PORT };
            (host, port)
        };

        debug!(
            partition = %partition,
            host = %host,
            port,
            global_catalog = use_global_catalog,
            "Resolved directory endpoint"
        );

        let credentials = BindCredentials {
            principal: creds.principal_name,
            secret: creds.secret,
        };

        Ok(DirectoryEndpoint::new(partition, host, port, credentials)
            .with_ssl(creds.use_ssl)
            .with_starttls(creds.use_starttls)
            .with_global_catalog(use_global_catalog)
            .with_bind_method(creds.bind_method)
            .with_connection_settings(creds.connection))
    }

    fn check_credentials(creds: &PartitionCredentials) -> DirectoryResult<()> {
        if creds.bind_method == BindMethod::Simple {
            if creds.principal_name.trim().is_empty() {
                return Err(DirectoryError::invalid_configuration(
                    "bind principal is required for simple binds",
                ));
            }
            if creds.secret.is_none() {
                return Err(DirectoryError::invalid_configuration(format!(
                    "no secret supplied for bind principal '{}'",
                    creds.principal_name
                )));
            }
        }

        if creds.use_ssl && creds.use_starttls {
            return Err(DirectoryError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        Ok(())
    }

    fn catalog_address(creds: &PartitionCredentials) -> DirectoryResult<(String, u16)> {
        if creds.catalog_host.trim().is_empty() {
            return Err(DirectoryError::invalid_configuration(
                "global catalog host is required",
            ));
        }

        let port = match creds.catalog_port {
            Some(0) => {
                return Err(DirectoryError::invalid_configuration(
                    "global catalog port must not be 0",
                ))
            }
            Some(port) => port,
            None if creds.use_ssl => GLOBAL_CATALOG_SSL_PORT,
            None => GLOBAL_CATALOG_PORT,
        };

        Ok((creds.catalog_host.clone(), port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectoryConfig, PartitionConfig};
    use crate::types::ScopeMode;

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("domain\\Administrator", "DC1.domain.com").with_password("Pass99")
    }

    #[test]
    fn test_partition_endpoint_uses_directory_port() {
        let config = config();
        let endpoint = EndpointResolver::new(&config)
            .resolve("child.domain.com", false)
            .unwrap();

        assert_eq!(endpoint.host(), "child.domain.com");
        assert_eq!(endpoint.port(), 389);
        assert!(!endpoint.is_global_catalog());
        assert!(endpoint.search_root().is_none());
        assert_eq!(endpoint.scope(), ScopeMode::Subtree);
        assert_eq!(endpoint.credentials().principal, "domain\\Administrator");
    }

    #[test]
    fn test_catalog_endpoint_uses_catalog_port() {
        let config = config();
        let endpoint = EndpointResolver::new(&config)
            .resolve("child.domain.com", true)
            .unwrap();

        assert_eq!(endpoint.host(), "DC1.domain.com");
        assert_eq!(endpoint.port(), 3268);
        assert!(endpoint.is_global_catalog());
        assert_eq!(endpoint.partition(), "child.domain.com");
    }

    #[test]
    fn test_ssl_ports() {
        let config = config().with_ssl();
        let resolver = EndpointResolver::new(&config);

        assert_eq!(resolver.resolve("child.domain.com", false).unwrap().port(), 636);
        assert_eq!(resolver.resolve("child.domain.com", true).unwrap().port(), 3269);
    }

    #[test]
    fn test_explicit_catalog_port_and_partition_host() {
        let config = config()
            .with_catalog_port(13268)
            .with_partition(PartitionConfig::new("child.domain.com").with_host("dc2.child.domain.com"));
        let resolver = EndpointResolver::new(&config);

        assert_eq!(resolver.resolve("child.domain.com", true).unwrap().port(), 13268);
        assert_eq!(
            resolver.resolve("child.domain.com", false).unwrap().host(),
            "dc2.child.domain.com"
        );
    }

    #[test]
    fn test_incomplete_parameters_are_configuration_errors() {
        let config = config();
        let resolver = EndpointResolver::new(&config);
        assert!(matches!(
            resolver.resolve("  ", false),
            Err(DirectoryError::InvalidConfiguration { .. })
        ));

        let mut no_secret = config.clone();
        no_secret.bind_password = None;
        assert!(matches!(
            EndpointResolver::new(&no_secret).resolve("child.domain.com", false),
            Err(DirectoryError::InvalidConfiguration { .. })
        ));

        let mut no_catalog = config.clone();
        no_catalog.global_catalog.host = String::new();
        assert!(EndpointResolver::new(&no_catalog)
            .resolve("child.domain.com", false)
            .is_ok());
        assert!(matches!(
            EndpointResolver::new(&no_catalog).resolve("child.domain.com", true),
            Err(DirectoryError::InvalidConfiguration { .. })
        ));

        let zero_port = config.with_catalog_port(0);
        assert!(EndpointResolver::new(&zero_port)
            .resolve("child.domain.com", true)
            .is_err());
    }

    #[test]
    fn test_negotiate_bind_needs_no_secret() {
        let mut config = config().with_bind_method(BindMethod::Negotiate);
        config.bind_password = None;

        let endpoint = EndpointResolver::new(&config)
            .resolve("child.domain.com", false)
            .unwrap();
        assert_eq!(endpoint.bind_method(), BindMethod::Negotiate);
        assert!(endpoint.credentials().secret.is_none());
    }
}
