//! Transport tests that need no directory server.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use xdomain_connector::prelude::*;
use xdomain_connector_ldap::LdapTransport;

fn init_test_logging() {
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

fn endpoint(port: u16) -> DirectoryEndpoint {
    DirectoryEndpoint::new(
        "child.domain.com",
        "127.0.0.1",
        port,
        BindCredentials::new("domain\\Administrator", "Pass99"),
    )
    .with_connection_settings(ConnectionSettings::default().with_connection_timeout(5))
}

#[tokio::test]
async fn test_unreachable_server_is_a_connection_error() {
    init_test_logging();
    // Port 1 (tcpmux) is not expected to be listening.
    let result = LdapTransport::new().connect(&endpoint(1)).await;

    let err = result.err().unwrap();
    assert_eq!(err.category(), ErrorCategory::Connection);
    assert!(matches!(
        err,
        DirectoryError::ConnectionFailed { .. } | DirectoryError::ConnectionTimeout { .. }
    ));
}

#[tokio::test]
async fn test_flow_surfaces_transport_failure() {
    init_test_logging();
    let config = DirectoryConfig::new("domain\\Administrator", "127.0.0.1")
        .with_password("Pass99")
        .with_catalog_port(1)
        .with_partition(PartitionConfig::new("child.domain.com").with_host("127.0.0.1"))
        .with_connection_settings(ConnectionSettings::default().with_connection_timeout(5));
    let flow =
        CrossPartitionMembership::from_config(config, std::sync::Arc::new(LdapTransport::new()))
            .unwrap();

    let request = MembershipRequest::new(
        "child.domain.com",
        AccountName::parse("alice").unwrap(),
        "Engineers",
    );
    let result = flow.add_account_to_group(&request).await;

    assert_eq!(
        result.err().map(|e| e.category()),
        Some(ErrorCategory::Connection)
    );
}
