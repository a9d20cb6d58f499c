//! Partition root DN resolution

use tracing::{debug, info, instrument};

use crate::endpoint::EndpointResolver;
use crate::error::{DirectoryError, DirectoryResult};
use crate::traits::{release, DirectoryConnection, DirectoryTransport};
use crate::types::DistinguishedName;

/// Root DSE attribute naming the partition's own naming context.
pub const DEFAULT_NAMING_CONTEXT: &str = "defaultNamingContext";

/// Reads the canonical DN of a partition's root object.
///
/// Catalog searches must be scoped to this DN; without it a forest-wide search
/// can return a principal from an unrelated partition with a colliding account
/// name.
pub struct RootDnResolver<'a> {
    transport: &'a dyn DirectoryTransport,
    endpoints: &'a EndpointResolver<'a>,
}

impl<'a> RootDnResolver<'a> {
    pub fn new(transport: &'a dyn DirectoryTransport, endpoints: &'a EndpointResolver<'a>) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Resolve the root DN of `partition` with one short-lived connection.
    #[instrument(skip(self))]
    pub async fn resolve_root_dn(&self, partition: &str) -> DirectoryResult<DistinguishedName> {
        let endpoint = self.endpoints.resolve(partition, false)?;

        let mut connection = self.transport.connect(&endpoint).await?;
        let result = Self::read_naming_context(connection.as_mut(), partition).await;
        release(connection).await;

        let root = result?;

        if let Ok(derived) = DistinguishedName::from_domain(partition) {
            if !derived.same_as(&root) {
                debug!(
                    partition = %partition,
                    resolved = %root,
                    derived = %derived,
                    "Naming context differs from the DNS-derived DN"
                );
            }
        }

        info!(partition = %partition, root_dn = %root, "Resolved partition root DN");
        Ok(root)
    }

    async fn read_naming_context(
        connection: &mut dyn DirectoryConnection,
        partition: &str,
    ) -> DirectoryResult<DistinguishedName> {
        let not_found = || DirectoryError::PartitionRootNotFound {
            partition: partition.to_string(),
        };

        let root = connection
            .read_root(&[DEFAULT_NAMING_CONTEXT])
            .await?
            .ok_or_else(not_found)?;

        let naming_context = root
            .first(DEFAULT_NAMING_CONTEXT)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(not_found)?;

        DistinguishedName::parse(naming_context)
    }
}
