//! # tradegraph-rbac: permission resolution and policy compilation
//!
//! Resolves a principal's graph-stored permissions into the three derived
//! views the query rewriter enforces:
//!
//! - **Row filters**: predicates restricting which nodes a query may return
//! - **Denied properties**: fields that must never reach the caller
//! - **Edge filters**: predicates restricting traversable relationships
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Permission Store (User/Role/Permission)     │
//! └─────────────────┬───────────────────────────┘
//!                   │ one read per request
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  SecurityContext (per-request resolver)      │
//! │  ├─ get_row_filters(label, action)           │
//! │  ├─ get_denied_properties(label, action)     │
//! │  └─ get_edge_filters(edge_type, action)      │
//! └─────────────────┬───────────────────────────┘
//!                   │ consumed by
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  tradegraph-query rewriter                   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! `PolicyManager` is the bulk counterpart: it compiles the whole
//! `Permission` collection into structured [`PolicyRule`]s for callers that
//! need the full policy in one shot rather than lazy per-query resolution.
//! Both paths compile identical semantics from the same permission data.
//!
//! ## Grant/deny semantics
//!
//! DENY always wins over GRANT for overlapping scope. The row condition a
//! label resolves to is
//!
//! ```text
//! (no ALLOW rules OR any ALLOW matches) AND NOT (any DENY matches)
//! ```
//!
//! ## Failure mode
//!
//! Resolution **fails closed**: if the permission store is unreachable or
//! returns malformed results, the resolver surfaces
//! [`ResolveError::PermissionResolution`] and the request fails as an
//! authorization error. It never degrades to unfiltered access.

pub mod condition;
pub mod context;
pub mod error;
pub mod permission;
pub mod policy;
pub mod store;

pub use condition::MalformedFilter;
pub use context::SecurityContext;
pub use error::{ResolveError, Result, StoreError};
pub use permission::{
    EdgeRule, GrantType, LabelScope, PermissionRecord, Polarity, PropertyRule, Resource, RowRule,
};
pub use policy::{PolicyManager, PolicyRule, RuleConditions, SecurityPolicy};
pub use store::{ALL_PERMISSIONS_QUERY, PermissionStore, USER_PERMISSIONS_QUERY};
