//! Directory error types
//!
//! A single error enum for every remote and configuration failure. Expected
//! absence (principal or group not found) is never an error; it is returned as a
//! typed outcome by the locator and the membership manager.

use serde::Serialize;
use thiserror::Error;

/// Error that can occur while resolving or mutating directory objects.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Configuration errors
    /// Connection parameters are missing or inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A value that should be a distinguished name does not parse as one.
    #[error("invalid distinguished name: '{value}'")]
    InvalidDistinguishedName { value: String },

    /// A search was attempted against an endpoint with no search root.
    #[error("search against {host} has no search root; un-scoped searches are not allowed")]
    UnscopedSearch { host: String },

    /// Configuration could not be decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    // Connection errors (fatal for the invocation)
    /// Failed to establish a connection or to talk to the directory server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connect or operation timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// The directory rejected the bind credentials.
    #[error("authentication failed for {principal}")]
    AuthenticationFailed { principal: String },

    /// The bound principal may not perform the operation.
    #[error("authorization failed: insufficient access rights for {operation}")]
    AuthorizationFailed { operation: String },

    /// The directory answered an operation with a failure result.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Not found
    /// The partition's root object did not resolve to a naming context.
    #[error("partition root not found for '{partition}'")]
    PartitionRootNotFound { partition: String },

    /// The target object of a modify does not exist.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    // Conflicts
    /// More than one object matched a predicate that must be unique.
    #[error("multiple matches found for {attribute}={value}")]
    MultipleMatches { attribute: String, value: String },

    /// The value being added is already present on the target object.
    #[error("value already exists on {identifier}")]
    ObjectAlreadyExists { identifier: String },
}

/// Broad classification of [`DirectoryError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad or missing parameters; fixing the configuration is required.
    Configuration,
    /// Bind, authentication or transport failure.
    Connection,
    /// An object that had to exist did not.
    NotFound,
    /// The directory state conflicts with the request.
    Conflict,
}

impl DirectoryError {
    /// Classify the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DirectoryError::InvalidConfiguration { .. }
            | DirectoryError::InvalidDistinguishedName { .. }
            | DirectoryError::UnscopedSearch { .. }
            | DirectoryError::Serialization { .. } => ErrorCategory::Configuration,
            DirectoryError::ConnectionFailed { .. }
            | DirectoryError::ConnectionTimeout { .. }
            | DirectoryError::AuthenticationFailed { .. }
            | DirectoryError::AuthorizationFailed { .. }
            | DirectoryError::OperationFailed { .. } => ErrorCategory::Connection,
            DirectoryError::PartitionRootNotFound { .. } | DirectoryError::ObjectNotFound { .. } => {
                ErrorCategory::NotFound
            }
            DirectoryError::MultipleMatches { .. } | DirectoryError::ObjectAlreadyExists { .. } => {
                ErrorCategory::Conflict
            }
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::InvalidDistinguishedName { .. } => "INVALID_DN",
            DirectoryError::UnscopedSearch { .. } => "UNSCOPED_SEARCH",
            DirectoryError::Serialization { .. } => "SERIALIZATION_ERROR",
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            DirectoryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            DirectoryError::AuthorizationFailed { .. } => "AUTHORIZATION_FAILED",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
            DirectoryError::PartitionRootNotFound { .. } => "PARTITION_ROOT_NOT_FOUND",
            DirectoryError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            DirectoryError::MultipleMatches { .. } => "MULTIPLE_MATCHES",
            DirectoryError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
        }
    }

    // Convenience constructors

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
