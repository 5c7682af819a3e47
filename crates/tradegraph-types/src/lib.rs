//! # tradegraph-types: shared primitives
//!
//! Foundation types used across the tradegraph access-control engine:
//!
//! - [`Principal`] — the authenticated (or anonymous) caller of a request
//! - [`Action`] — the operation a permission governs (read, write, delete)
//! - [`Scalar`] — a typed graph value as it appears in parameters,
//!   property filters, and store rows
//! - [`Params`] — a named query-parameter map
//! - [`Row`] — a named-column row returned by the permission store
//!
//! These types carry no policy logic of their own; resolution and
//! enforcement live in `tradegraph-rbac` and `tradegraph-query`.

pub mod principal;
pub mod value;

pub use principal::{Action, Principal};
pub use value::{Params, Row, Scalar};
