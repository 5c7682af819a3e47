//! Secured graph access.
//!
//! [`SecureGraph`] pairs a graph executor with a per-request
//! [`SecurityContext`]: every query is rewritten before execution and the
//! returned rows are scrubbed of denied properties afterwards. The second
//! pass matters for whole-node projections, where the executor flattens a
//! node into `variable.property` columns the rewriter never saw.
//!
//! [`GraphAccess`] decides at construction whether a caller needs the
//! secured path at all; superusers get the raw executor with no per-query
//! branching.

use tracing::debug;
use tradegraph_rbac::{PermissionStore, SecurityContext, StoreError};
use tradegraph_types::{Action, Params, Principal, Row, Scalar};

use crate::ast::Clause;
use crate::bindings::Bindings;
use crate::error::Result;
use crate::parser::parse_query;
use crate::rewrite::{QueryRewriter, project_scope};

/// Executes queries against the underlying graph.
pub trait GraphExecutor {
    fn execute(&self, query: &str, params: &Params)
    -> std::result::Result<Vec<Row>, StoreError>;
}

impl<G: GraphExecutor> GraphExecutor for &G {
    fn execute(
        &self,
        query: &str,
        params: &Params,
    ) -> std::result::Result<Vec<Row>, StoreError> {
        (*self).execute(query, params)
    }
}

/// A graph handle that enforces one principal's permissions on every query.
pub struct SecureGraph<G, S> {
    graph: G,
    context: SecurityContext<S>,
}

impl<G: GraphExecutor, S: PermissionStore> SecureGraph<G, S> {
    pub fn new(graph: G, context: SecurityContext<S>) -> Self {
        Self { graph, context }
    }

    /// Returns the security context backing this handle.
    pub fn context(&self) -> &SecurityContext<S> {
        &self.context
    }

    /// Rewrites, executes and redacts `query` under the principal's
    /// permissions.
    pub fn query(&mut self, query: &str, params: &Params, action: Action) -> Result<Vec<Row>> {
        let rewritten = QueryRewriter::new(&mut self.context).rewrite(query, params, action)?;
        let mut rows = self.graph.execute(&rewritten.query, &rewritten.params)?;
        self.redact_rows(query, &mut rows, action)?;
        debug!(rows = rows.len(), "Executed secured query");
        Ok(rows)
    }

    /// Nulls `variable.property` columns whose property is denied for the
    /// variable's labels. Columns are keyed by the names the final
    /// projection exposes, so a node re-exposed under a WITH alias is
    /// scrubbed under the alias. Already-null columns stay null, so
    /// redaction is idempotent.
    fn redact_rows(&mut self, original: &str, rows: &mut [Row], action: Action) -> Result<()> {
        if self.context.is_superuser() || rows.is_empty() {
            return Ok(());
        }
        let ast = parse_query(original)?;
        let bindings = Bindings::extract(&ast)?;

        let mut scope = bindings.nodes.clone();
        for clause in &ast.clauses {
            if let Clause::With(w) = clause {
                scope = project_scope(&w.items, &scope);
            }
        }

        for (var, labels) in &scope {
            for label in labels {
                let denied = self.context.get_denied_properties(label, action)?;
                for property in &denied {
                    let column = format!("{var}.{property}");
                    for row in rows.iter_mut() {
                        if row.get(&column).is_some() {
                            row.set(column.clone(), Scalar::Null);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Graph access with the security decision made once, at construction.
pub enum GraphAccess<G, S> {
    /// Unrestricted access; used for superusers.
    Open(G),
    /// Rewriting and redaction on every query.
    Secured(SecureGraph<G, S>),
}

impl<G: GraphExecutor, S: PermissionStore> GraphAccess<G, S> {
    /// Wraps `graph` for `principal`, choosing the open path for
    /// superusers and the secured path for everyone else.
    pub fn wrap(principal: Principal, graph: G, store: S) -> Self {
        if principal.superuser {
            debug!(user = %principal.display_name(), "Open graph access");
            GraphAccess::Open(graph)
        } else {
            GraphAccess::Secured(SecureGraph::new(graph, SecurityContext::new(principal, store)))
        }
    }

    /// Executes `query` through whichever path was chosen at construction.
    pub fn query(&mut self, query: &str, params: &Params, action: Action) -> Result<Vec<Row>> {
        match self {
            GraphAccess::Open(graph) => Ok(graph.execute(query, params)?),
            GraphAccess::Secured(secured) => secured.query(query, params, action),
        }
    }
}
