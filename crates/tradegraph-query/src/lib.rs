//! # tradegraph-query: Cypher-subset parsing and security rewriting
//!
//! Front end of the data-level access-control engine. Queries are parsed
//! into a real AST, rewritten against the caller's resolved permissions,
//! and rendered back to text:
//!
//! - **Row filters** become WHERE predicates on the MATCH clause that
//!   binds each label
//! - **Edge filters** attach to relationship variables, rejecting
//!   patterns that cannot carry one
//! - **Denied properties** are dropped from WITH/RETURN projections and
//!   nulled in result rows
//! - **Audit parameters** record the acting user and roles on every
//!   non-superuser execution
//!
//! The rewriter never guesses: ambiguous variable bindings, self-joins on
//! a filtered label, and parameter collisions are errors, not best-effort
//! passes.
//!
//! ```
//! use tradegraph_query::{GraphAccess, GraphExecutor};
//! use tradegraph_rbac::{PermissionStore, StoreError};
//! use tradegraph_types::{Action, Params, Principal, Row};
//!
//! struct EmptyGraph;
//! impl GraphExecutor for EmptyGraph {
//!     fn execute(&self, _q: &str, _p: &Params) -> Result<Vec<Row>, StoreError> {
//!         Ok(Vec::new())
//!     }
//! }
//! struct EmptyStore;
//! impl PermissionStore for EmptyStore {
//!     fn execute(&self, _q: &str, _p: &Params) -> Result<Vec<Row>, StoreError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! let principal = Principal::new("emma_restricted", vec!["trader".into()]);
//! let mut graph = GraphAccess::wrap(principal, EmptyGraph, EmptyStore);
//! let rows = graph
//!     .query("MATCH (g:Geography) RETURN g.name", &Params::new(), Action::Read)
//!     .unwrap();
//! assert!(rows.is_empty());
//! ```

pub mod ast;
pub mod bindings;
pub mod error;
pub mod parser;
pub mod rewrite;
pub mod secure;
pub mod token;

pub use bindings::Bindings;
pub use error::{ParseError, Result, RewriteError};
pub use parser::{parse_expression, parse_query};
pub use rewrite::{AUDIT_ROLES_PARAM, AUDIT_USER_PARAM, QueryRewriter, RewrittenQuery};
pub use secure::{GraphAccess, GraphExecutor, SecureGraph};
