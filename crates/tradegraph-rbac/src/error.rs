//! Error types for permission resolution.

use thiserror::Error;

/// Error from the underlying permission store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store rejected or failed to execute a query.
    #[error("permission store query failed: {0}")]
    Query(String),

    /// The store could not be reached.
    #[error("permission store unavailable: {0}")]
    Unavailable(String),
}

/// Error raised while resolving or checking permissions.
///
/// Every variant is an authorization failure from the caller's point of
/// view: a request must fail rather than proceed unfiltered.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The permission store could not be consulted. The affected scope is
    /// treated as fully denied (fail closed).
    #[error("permission resolution failed for '{username}': {source}")]
    PermissionResolution {
        username: String,
        #[source]
        source: StoreError,
    },

    /// A required permission is not held by the principal.
    #[error("user '{username}' does not have permission '{permission}'")]
    PermissionDenied {
        username: String,
        permission: String,
    },

    /// An operation requires an authenticated principal.
    #[error("authentication required")]
    AuthenticationRequired,
}

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;
