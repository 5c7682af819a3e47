//! Read interface to the permission store.
//!
//! The engine never owns permission data; it consumes a graph-queryable
//! collection of `User`/`Role`/`Permission` records through this trait.
//! Rows expose the bare `Permission` property names as columns.

use tradegraph_types::{Params, Row};

use crate::error::StoreError;

/// Query issued once per request to resolve a principal's permissions.
///
/// Binds `$username`; returns one row per distinct permission reachable
/// through the principal's roles.
pub const USER_PERMISSIONS_QUERY: &str = "MATCH (u:User {username: $username})-[:HAS_ROLE]->(r:Role)-[:HAS_PERMISSION]->(p:Permission) RETURN DISTINCT p.name, p.resource, p.action, p.node_label, p.edge_type, p.property_name, p.property_filter, p.attribute_conditions, p.grant_type";

/// Query issued by the policy compiler to load the whole permission set.
pub const ALL_PERMISSIONS_QUERY: &str = "MATCH (p:Permission) RETURN p.name, p.resource, p.action, p.node_label, p.edge_type, p.property_name, p.property_filter, p.attribute_conditions, p.grant_type";

/// A graph-queryable source of permission records.
///
/// Implementations are read-only from the engine's perspective. A failed
/// call must return an error; the resolver treats any failure as a
/// fail-closed denial, so implementations should not mask outages by
/// returning empty results for queries they could not actually run.
pub trait PermissionStore {
    /// Executes a read-only query and returns its rows.
    fn execute(&self, query: &str, params: &Params) -> Result<Vec<Row>, StoreError>;
}

impl<S: PermissionStore + ?Sized> PermissionStore for &S {
    fn execute(&self, query: &str, params: &Params) -> Result<Vec<Row>, StoreError> {
        (**self).execute(query, params)
    }
}
