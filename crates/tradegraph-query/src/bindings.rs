//! Variable-to-label and variable-to-type binding extraction.
//!
//! The rewriter needs to know, for every variable a query binds, which node
//! labels or relationship type it stands for. A pattern may carry several
//! labels (`(b:BalanceSheet:Audited)`); the variable then matches their
//! intersection, and every label's rules apply. What extraction refuses is
//! genuine ambiguity: the same variable re-labeled differently in another
//! pattern, or shared between a node and a relationship — there is no way
//! to know which rules to enforce, so it errors rather than guess.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{Clause, Query};
use crate::error::RewriteError;

/// Bindings extracted from a parsed query.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bindings {
    /// Node variable to its label set.
    pub nodes: BTreeMap<String, BTreeSet<String>>,
    /// Relationship variable to its type.
    pub rels: BTreeMap<String, String>,
    /// Labels bound to more than one variable within a single MATCH
    /// clause. Filtering such a clause is deferred until rules are known
    /// to apply; see the rewriter's self-join handling.
    pub duplicate_labels: BTreeSet<String>,
    /// Every variable name in scope, labeled or not. Used to pick fresh
    /// names for anonymous patterns that need filtering.
    pub variables: BTreeSet<String>,
}

impl Bindings {
    /// Walks `query` and collects every binding, rejecting conflicts.
    pub fn extract(query: &Query) -> Result<Self, RewriteError> {
        let mut bindings = Self::default();

        for clause in &query.clauses {
            let Clause::Match(m) = clause else { continue };
            let mut labels_in_clause: BTreeMap<&str, &str> = BTreeMap::new();

            for pattern in &m.patterns {
                for node in pattern.nodes() {
                    if let Some(var) = &node.variable {
                        bindings.variables.insert(var.clone());
                        if !node.labels.is_empty() {
                            bindings.bind_node(var, &node.labels)?;
                        }
                        for label in &node.labels {
                            match labels_in_clause.get(label.as_str()) {
                                Some(prev) if *prev != var.as_str() => {
                                    bindings.duplicate_labels.insert(label.clone());
                                }
                                _ => {
                                    labels_in_clause.insert(label, var);
                                }
                            }
                        }
                    }
                }
                for (rel, _) in &pattern.segments {
                    if let Some(var) = &rel.variable {
                        bindings.variables.insert(var.clone());
                        if let Some(ty) = rel.types.first() {
                            bindings.bind_rel(var, ty)?;
                        }
                    }
                }
            }
        }

        Ok(bindings)
    }

    /// Picks a variable name not yet in scope, registering it.
    pub fn fresh_variable(&mut self, hint: &str) -> String {
        let base = format!("_{}", hint.to_ascii_lowercase());
        let mut name = base.clone();
        let mut n = 0;
        while self.variables.contains(&name) {
            n += 1;
            name = format!("{base}{n}");
        }
        self.variables.insert(name.clone());
        name
    }

    fn bind_node(&mut self, var: &str, labels: &[String]) -> Result<(), RewriteError> {
        let incoming: BTreeSet<String> = labels.iter().cloned().collect();
        if let Some(existing) = self.nodes.get(var) {
            if *existing != incoming {
                return Err(RewriteError::BindingAmbiguity {
                    variable: var.to_string(),
                    first: existing.iter().next().cloned().unwrap_or_default(),
                    second: labels[0].clone(),
                });
            }
        } else {
            if let Some(ty) = self.rels.get(var) {
                return Err(RewriteError::BindingAmbiguity {
                    variable: var.to_string(),
                    first: ty.clone(),
                    second: labels[0].clone(),
                });
            }
            self.nodes.insert(var.to_string(), incoming);
        }
        Ok(())
    }

    fn bind_rel(&mut self, var: &str, ty: &str) -> Result<(), RewriteError> {
        if let Some(existing) = self.rels.get(var) {
            if existing != ty {
                return Err(RewriteError::BindingAmbiguity {
                    variable: var.to_string(),
                    first: existing.clone(),
                    second: ty.to_string(),
                });
            }
        } else {
            if let Some(labels) = self.nodes.get(var) {
                return Err(RewriteError::BindingAmbiguity {
                    variable: var.to_string(),
                    first: labels.iter().next().cloned().unwrap_or_default(),
                    second: ty.to_string(),
                });
            }
            self.rels.insert(var.to_string(), ty.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;

    fn extract(text: &str) -> Result<Bindings, RewriteError> {
        Bindings::extract(&parse_query(text).unwrap())
    }

    fn labels<'a>(bindings: &'a Bindings, var: &str) -> Vec<&'a str> {
        bindings.nodes[var].iter().map(String::as_str).collect()
    }

    #[test]
    fn test_extracts_node_and_rel_bindings() {
        let b = extract(
            "MATCH (a:Geography)-[t:TRADES_WITH]->(b:Geography) RETURN a",
        )
        .unwrap();
        assert_eq!(labels(&b, "a"), vec!["Geography"]);
        assert_eq!(labels(&b, "b"), vec!["Geography"]);
        assert_eq!(b.rels.get("t").map(String::as_str), Some("TRADES_WITH"));
        assert!(b.duplicate_labels.contains("Geography"));
    }

    #[test]
    fn test_multiple_labels_collected_per_variable() {
        let b = extract("MATCH (b:BalanceSheet:Audited) RETURN b").unwrap();
        assert_eq!(labels(&b, "b"), vec!["Audited", "BalanceSheet"]);
    }

    #[test]
    fn test_same_label_across_clauses_is_not_a_self_join() {
        let b = extract(
            "MATCH (a:Geography) MATCH (b:Geography) RETURN a, b",
        )
        .unwrap();
        assert!(b.duplicate_labels.is_empty());
    }

    #[test]
    fn test_repeated_variable_with_consistent_labels() {
        let b = extract("MATCH (g:Geography) MATCH (g)-[:HAS_INDICATOR]->(i:Indicator) RETURN i")
            .unwrap();
        assert_eq!(labels(&b, "g"), vec!["Geography"]);
        assert!(b.duplicate_labels.is_empty());
    }

    #[test]
    fn test_conflicting_labels_rejected() {
        let err = extract("MATCH (g:Geography) MATCH (g:BalanceSheet) RETURN g").unwrap_err();
        assert!(matches!(err, RewriteError::BindingAmbiguity { .. }));

        // A relabeling that adds to the set is just as ambiguous.
        let err =
            extract("MATCH (g:Geography) MATCH (g:Geography:Region) RETURN g").unwrap_err();
        assert!(matches!(err, RewriteError::BindingAmbiguity { .. }));
    }

    #[test]
    fn test_variable_shared_between_node_and_rel_rejected() {
        let err = extract("MATCH (x:Geography)-[x:TRADES_WITH]->(b) RETURN b").unwrap_err();
        assert!(matches!(err, RewriteError::BindingAmbiguity { .. }));
    }

    #[test]
    fn test_fresh_variable_avoids_collisions() {
        let mut b = extract("MATCH (_geography:Geography) RETURN _geography").unwrap();
        assert_eq!(b.fresh_variable("Geography"), "_geography1");
        assert_eq!(b.fresh_variable("Geography"), "_geography2");
    }
}
