//! Security query rewriting.
//!
//! [`QueryRewriter`] turns a caller's query into one the graph can execute
//! on the caller's behalf: row filters become WHERE predicates on the
//! clauses that bind each label, edge filters attach to relationship
//! variables, and projections referencing denied properties are dropped.
//! Two audit parameters record who the query ran as.
//!
//! Rewriting is deliberately conservative. Anything the rewriter cannot
//! secure — ambiguous bindings, self-joins on a filtered label,
//! variable-length relationships that need an edge filter — is rejected
//! rather than passed through unfiltered.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use tradegraph_rbac::{PermissionStore, SecurityContext};
use tradegraph_types::{Action, Params, Scalar};

use crate::ast::{Clause, Expr, Literal, ProjectionItem, Query};
use crate::bindings::Bindings;
use crate::error::{Result, RewriteError};
use crate::parser::{parse_expression, parse_query};

/// Parameter carrying the acting user's id (or null when anonymous).
pub const AUDIT_USER_PARAM: &str = "__security_user_id__";

/// Parameter carrying the acting user's role names.
pub const AUDIT_ROLES_PARAM: &str = "__security_roles__";

/// The result of a rewrite: executable query text plus final parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenQuery {
    pub query: String,
    pub params: Params,
}

/// Rewrites queries under one principal's resolved permissions.
///
/// Borrows the [`SecurityContext`] mutably because resolution is lazy and
/// cached inside the context; a rewriter is as per-request as the context
/// it wraps.
pub struct QueryRewriter<'a, S> {
    context: &'a mut SecurityContext<S>,
}

impl<'a, S: PermissionStore> QueryRewriter<'a, S> {
    pub fn new(context: &'a mut SecurityContext<S>) -> Self {
        Self { context }
    }

    /// Rewrites `query` for `action`, returning the text to execute and
    /// the parameters to execute it with.
    ///
    /// Superusers get the input back byte for byte, parameters untouched.
    /// For everyone else the audit parameters are always added, and the
    /// query text is returned unchanged when no filter or redaction
    /// applied to it.
    pub fn rewrite(
        &mut self,
        query: &str,
        params: &Params,
        action: Action,
    ) -> Result<RewrittenQuery> {
        if self.context.is_superuser() {
            debug!(user = %self.context.principal().display_name(), "Superuser bypass");
            return Ok(RewrittenQuery {
                query: query.to_string(),
                params: params.clone(),
            });
        }

        let mut ast = parse_query(query)?;
        let mut bindings = Bindings::extract(&ast)?;

        let mut changed = self.apply_row_filters(&mut ast, &mut bindings, action)?;
        changed |= self.apply_edge_filters(&mut ast, &mut bindings, action)?;
        changed |= self.redact_projections(&mut ast, &bindings, action)?;

        let params = self.audit_params(params)?;
        let text = if changed {
            ast.to_string()
        } else {
            query.to_string()
        };

        debug!(
            user = %self.context.principal().display_name(),
            action = %action,
            changed,
            "Rewrote query"
        );
        Ok(RewrittenQuery { query: text, params })
    }

    /// Attaches row-filter predicates to the clause binding each label.
    ///
    /// Each variable is filtered once, at its first labeled occurrence.
    /// Anonymous labeled nodes that need a filter get a fresh variable so
    /// the predicate has something to qualify against.
    fn apply_row_filters(
        &mut self,
        ast: &mut Query,
        bindings: &mut Bindings,
        action: Action,
    ) -> Result<bool> {
        let mut changed = false;
        let mut filtered: BTreeSet<String> = BTreeSet::new();

        for clause in &mut ast.clauses {
            let Clause::Match(m) = clause else { continue };
            let mut predicates: Vec<Expr> = Vec::new();

            for pattern in &mut m.patterns {
                for node in pattern.nodes_mut() {
                    // Every label on the pattern contributes its rules; the
                    // conjunction only narrows the match.
                    let mut scoped: Vec<(String, Vec<String>)> = Vec::new();
                    for label in &node.labels {
                        let fragments = self.context.get_row_filters(label, action)?;
                        let denied = self.context.get_denied_properties(label, action)?;
                        if fragments.is_empty() && denied.is_empty() {
                            continue;
                        }
                        if bindings.duplicate_labels.contains(label) {
                            return Err(RewriteError::SelfJoinAmbiguity {
                                label: label.clone(),
                            });
                        }
                        if !fragments.is_empty() {
                            scoped.push((label.clone(), fragments));
                        }
                    }
                    if scoped.is_empty() {
                        continue;
                    }

                    let var = match &node.variable {
                        Some(v) => {
                            if !filtered.insert(v.clone()) {
                                continue;
                            }
                            v.clone()
                        }
                        None => {
                            let fresh = bindings.fresh_variable(&scoped[0].0);
                            node.variable = Some(fresh.clone());
                            fresh
                        }
                    };

                    for (label, fragments) in &scoped {
                        for fragment in fragments {
                            let parsed = parse_expression(fragment).map_err(|source| {
                                RewriteError::FilterFragment {
                                    scope: format!("{label}:{action}"),
                                    source,
                                }
                            })?;
                            predicates.push(qualify(parsed, &var));
                        }
                    }
                    changed = true;
                }
            }

            for predicate in predicates {
                m.and_where(predicate);
            }
        }
        Ok(changed)
    }

    /// Attaches edge-filter predicates to relationship patterns.
    fn apply_edge_filters(
        &mut self,
        ast: &mut Query,
        bindings: &mut Bindings,
        action: Action,
    ) -> Result<bool> {
        let mut changed = false;
        let mut filtered: BTreeSet<String> = BTreeSet::new();

        for clause in &mut ast.clauses {
            let Clause::Match(m) = clause else { continue };
            let mut predicates: Vec<Expr> = Vec::new();

            for pattern in &mut m.patterns {
                for (rel, _) in &mut pattern.segments {
                    let Some(ty) = rel.types.first().cloned() else {
                        continue;
                    };
                    let fragments = self.context.get_edge_filters(&ty, action)?;
                    if fragments.is_empty() {
                        continue;
                    }
                    if rel.var_length.is_some() {
                        return Err(RewriteError::UnsupportedPattern {
                            detail: format!(
                                "variable-length relationship of type '{ty}' requires a filter"
                            ),
                        });
                    }

                    let var = match &rel.variable {
                        Some(v) => {
                            if !filtered.insert(v.clone()) {
                                continue;
                            }
                            v.clone()
                        }
                        None => {
                            let fresh = bindings.fresh_variable(&ty);
                            rel.variable = Some(fresh.clone());
                            fresh
                        }
                    };

                    for fragment in &fragments {
                        let parsed = parse_expression(fragment).map_err(|source| {
                            RewriteError::FilterFragment {
                                scope: format!("{ty}:{action}"),
                                source,
                            }
                        })?;
                        predicates.push(qualify(parsed, &var));
                    }
                    changed = true;
                }
            }

            for predicate in predicates {
                m.and_where(predicate);
            }
        }
        Ok(changed)
    }

    /// Drops projection items that reference a denied property.
    ///
    /// Applies to WITH and RETURN alike, tracking which variables survive
    /// each WITH so aliases of node variables stay covered. A projection
    /// emptied by redaction falls back to the bare node variables still in
    /// scope.
    fn redact_projections(
        &mut self,
        ast: &mut Query,
        bindings: &Bindings,
        action: Action,
    ) -> Result<bool> {
        let mut changed = false;
        let mut scope: BTreeMap<String, BTreeSet<String>> = bindings.nodes.clone();

        for clause in &mut ast.clauses {
            let Clause::With(w) = clause else { continue };
            changed |= self.redact_items(&mut w.items, &scope, action)?;
            scope = project_scope(&w.items, &scope);
        }

        if let Some(ret) = &mut ast.ret {
            changed |= self.redact_items(&mut ret.items, &scope, action)?;
        }
        Ok(changed)
    }

    fn redact_items(
        &mut self,
        items: &mut Vec<ProjectionItem>,
        scope: &BTreeMap<String, BTreeSet<String>>,
        action: Action,
    ) -> Result<bool> {
        let mut kept = Vec::with_capacity(items.len());
        let mut dropped = false;
        for item in items.drain(..) {
            if self.references_denied(&item.expr, scope, action)? {
                dropped = true;
            } else {
                kept.push(item);
            }
        }
        if dropped && kept.is_empty() {
            // Keep the projection well-formed; record-level redaction
            // nulls the denied fields on whole-node results.
            kept = scope
                .keys()
                .map(|var| ProjectionItem {
                    expr: Expr::Ident(var.clone()),
                    alias: None,
                })
                .collect();
            if kept.is_empty() {
                kept.push(ProjectionItem {
                    expr: Expr::Literal(Literal::Null),
                    alias: None,
                });
            }
        }
        *items = kept;
        Ok(dropped)
    }

    fn references_denied(
        &mut self,
        expr: &Expr,
        scope: &BTreeMap<String, BTreeSet<String>>,
        action: Action,
    ) -> Result<bool> {
        match expr {
            Expr::Property { base, name } => {
                if let Expr::Ident(var) = base.as_ref() {
                    if let Some(node_labels) = scope.get(var) {
                        for label in node_labels {
                            let denied = self.context.get_denied_properties(label, action)?;
                            if denied.contains(name) {
                                return Ok(true);
                            }
                        }
                    }
                    Ok(false)
                } else {
                    self.references_denied(base, scope, action)
                }
            }
            Expr::Or(l, r) | Expr::And(l, r) => Ok(self.references_denied(l, scope, action)?
                || self.references_denied(r, scope, action)?),
            Expr::Not(inner) => self.references_denied(inner, scope, action),
            Expr::Compare { left, right, .. } => Ok(self
                .references_denied(left, scope, action)?
                || self.references_denied(right, scope, action)?),
            Expr::In { expr, list, .. } => Ok(self.references_denied(expr, scope, action)?
                || self.references_denied(list, scope, action)?),
            Expr::IsNull { expr, .. } => self.references_denied(expr, scope, action),
            Expr::FunctionCall { args, .. } | Expr::List(args) => {
                for arg in args {
                    if self.references_denied(arg, scope, action)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Ident(_) | Expr::Param(_) | Expr::Literal(_) | Expr::Star => Ok(false),
        }
    }

    /// Clones `params` with the audit parameters added.
    fn audit_params(&self, params: &Params) -> Result<Params> {
        for key in [AUDIT_USER_PARAM, AUDIT_ROLES_PARAM] {
            if params.contains_key(key) {
                return Err(RewriteError::ParameterCollision {
                    key: key.to_string(),
                });
            }
        }
        let mut out = params.clone();
        out.insert(
            AUDIT_USER_PARAM,
            match self.context.username() {
                Some(user) => Scalar::Text(user.to_string()),
                None => Scalar::Null,
            },
        );
        out.insert(
            AUDIT_ROLES_PARAM,
            Scalar::List(
                self.context
                    .roles()
                    .iter()
                    .map(|role| Scalar::Text(role.clone()))
                    .collect(),
            ),
        );
        Ok(out)
    }
}

/// Computes the variable scope after a WITH projection.
pub(crate) fn project_scope(
    items: &[ProjectionItem],
    scope: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut next = BTreeMap::new();
    for item in items {
        match &item.expr {
            Expr::Star => next.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone()))),
            Expr::Ident(var) => {
                if let Some(node_labels) = scope.get(var) {
                    let name = item.alias.clone().unwrap_or_else(|| var.clone());
                    next.insert(name, node_labels.clone());
                }
            }
            _ => {}
        }
    }
    next
}

/// Points a stored filter fragment at the bound variable.
///
/// Fragments use either unqualified property names (`region = 'EU'`) or
/// the generic variable `n` (`n.year >= 2024`); both forms resolve to the
/// variable the pattern bound. References already qualified with another
/// variable are left alone.
fn qualify(expr: Expr, var: &str) -> Expr {
    match expr {
        Expr::Ident(name) => {
            if name == "n" {
                Expr::Ident(var.to_string())
            } else {
                Expr::property(var, name)
            }
        }
        Expr::Property { base, name } => match *base {
            Expr::Ident(b) if b == "n" => Expr::property(var, name),
            b @ Expr::Ident(_) => Expr::Property {
                base: Box::new(b),
                name,
            },
            other => Expr::Property {
                base: Box::new(qualify(other, var)),
                name,
            },
        },
        Expr::Or(l, r) => Expr::Or(Box::new(qualify(*l, var)), Box::new(qualify(*r, var))),
        Expr::And(l, r) => Expr::And(Box::new(qualify(*l, var)), Box::new(qualify(*r, var))),
        Expr::Not(inner) => Expr::Not(Box::new(qualify(*inner, var))),
        Expr::Compare { op, left, right } => Expr::Compare {
            op,
            left: Box::new(qualify(*left, var)),
            right: Box::new(qualify(*right, var)),
        },
        Expr::In {
            expr,
            list,
            negated,
        } => Expr::In {
            expr: Box::new(qualify(*expr, var)),
            list: Box::new(qualify(*list, var)),
            negated,
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(qualify(*expr, var)),
            negated,
        },
        Expr::FunctionCall { name, args } => Expr::FunctionCall {
            name,
            args: args.into_iter().map(|a| qualify(a, var)).collect(),
        },
        Expr::List(items) => Expr::List(items.into_iter().map(|i| qualify(i, var)).collect()),
        done @ (Expr::Param(_) | Expr::Literal(_) | Expr::Star) => done,
    }
}
