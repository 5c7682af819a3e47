//! Bulk policy compilation.
//!
//! [`PolicyManager`] converts the whole `Permission` collection into
//! structured [`PolicyRule`]s for callers that need the full policy in one
//! shot — building an in-memory authorization index, exporting policy for
//! review — rather than the lazy per-query resolution of
//! [`crate::SecurityContext`]. Both compile identical semantics from the
//! same permission data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tradegraph_types::Scalar;

use crate::condition::MalformedFilter;
use crate::error::{ResolveError, Result};
use crate::permission::{GrantType, PermissionRecord, Resource};
use crate::store::{ALL_PERMISSIONS_QUERY, PermissionStore};

/// A compiled policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Action the rule governs (raw store string, e.g. `"read"`).
    pub action: String,
    /// Resource pattern: a node label, an edge type, or
    /// `"{label}.{property}"` with `*` allowed as the label.
    pub resource_pattern: String,
    /// Grant or deny.
    pub grant_type: GrantType,
    /// Structured conditions, when the permission carries any.
    pub conditions: Option<RuleConditions>,
}

/// Structured conditions attached to a [`PolicyRule`].
///
/// Merges the permission's scope fields with its parsed `property_filter`
/// equality map and verbatim `attribute_conditions` text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    /// Node label scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_label: Option<String>,
    /// Edge type scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    /// Property scope, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    /// Exact-match equality constraints from `property_filter`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_filter: Option<BTreeMap<String, Scalar>>,
    /// Raw predicate text over the generic variable `n`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_conditions: Option<String>,
}

impl RuleConditions {
    fn is_empty(&self) -> bool {
        self.node_label.is_none()
            && self.edge_type.is_none()
            && self.property_name.is_none()
            && self.property_filter.is_none()
            && self.attribute_conditions.is_none()
    }
}

/// The full compiled policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// All compiled rules, in store order.
    pub rules: Vec<PolicyRule>,
}

impl SecurityPolicy {
    /// Rules whose resource pattern is exactly `pattern`.
    pub fn rules_for(&self, pattern: &str) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().filter(move |r| r.resource_pattern == pattern)
    }
}

/// Compiles `Permission` records into a [`SecurityPolicy`].
pub struct PolicyManager<S> {
    store: S,
    cache: Option<SecurityPolicy>,
    diagnostics: Vec<MalformedFilter>,
}

impl<S: PermissionStore> PolicyManager<S> {
    /// Creates a manager over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: None,
            diagnostics: Vec::new(),
        }
    }

    /// Loads every permission from the store and compiles the policy.
    ///
    /// A permission whose `property_filter` fails to parse contributes no
    /// rule; the diagnostic is recorded in [`Self::diagnostics`] so the
    /// drop is auditable. Store failures fail closed.
    pub fn load_policy(&mut self) -> Result<SecurityPolicy> {
        let rows = self
            .store
            .execute(ALL_PERMISSIONS_QUERY, &tradegraph_types::Params::new())
            .map_err(|source| {
                warn!(error = %source, "Policy load failed; failing closed");
                ResolveError::PermissionResolution {
                    username: "<policy>".to_string(),
                    source,
                }
            })?;

        self.diagnostics.clear();
        let mut rules = Vec::new();
        for row in &rows {
            let Some(record) = PermissionRecord::from_row(row) else {
                continue;
            };
            match compile_rule(&record) {
                Ok(rule) => rules.push(rule),
                Err(diag) => {
                    warn!(error = %diag, "Dropping permission with malformed filter");
                    self.diagnostics.push(diag);
                }
            }
        }

        debug!(rules = rules.len(), dropped = self.diagnostics.len(), "Compiled policy");
        let policy = SecurityPolicy { rules };
        self.cache = Some(policy.clone());
        Ok(policy)
    }

    /// Returns the last compiled policy without touching the store.
    pub fn cached_policy(&self) -> Option<&SecurityPolicy> {
        self.cache.as_ref()
    }

    /// Drops the cached policy.
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Diagnostics recorded by the most recent [`Self::load_policy`] call.
    pub fn diagnostics(&self) -> &[MalformedFilter] {
        &self.diagnostics
    }
}

/// Compiles one permission record into a policy rule.
fn compile_rule(record: &PermissionRecord) -> std::result::Result<PolicyRule, MalformedFilter> {
    let property_filter = match record.property_filter.as_deref() {
        None => None,
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| MalformedFilter {
                    permission: record.name.clone(),
                    detail: e.to_string(),
                })?;
            let Some(map) = value.as_object() else {
                return Err(MalformedFilter {
                    permission: record.name.clone(),
                    detail: format!("expected a JSON object, got: {value}"),
                });
            };
            let mut filter = BTreeMap::new();
            for (key, json) in map {
                let Some(scalar) = Scalar::from_json(json) else {
                    return Err(MalformedFilter {
                        permission: record.name.clone(),
                        detail: format!("value for '{key}' is not a scalar"),
                    });
                };
                filter.insert(key.clone(), scalar);
            }
            Some(filter)
        }
    };

    let conditions = RuleConditions {
        node_label: record.node_label.clone(),
        edge_type: record.edge_type.clone(),
        property_name: record.property_name.clone(),
        property_filter,
        attribute_conditions: record.attribute_conditions.clone(),
    };

    Ok(PolicyRule {
        action: record.action.clone(),
        resource_pattern: resource_pattern(record),
        grant_type: record.grant_type,
        conditions: if conditions.is_empty() { None } else { Some(conditions) },
    })
}

/// Derives the resource pattern for a permission.
fn resource_pattern(record: &PermissionRecord) -> String {
    match record.resource {
        Resource::Node => record
            .node_label
            .clone()
            .unwrap_or_else(|| "node".to_string()),
        Resource::Edge => record
            .edge_type
            .clone()
            .unwrap_or_else(|| "edge".to_string()),
        Resource::Property => match record.property_name.as_deref() {
            Some(property) => {
                let label = record.node_label.as_deref().unwrap_or("*");
                format!("{label}.{property}")
            }
            None => "property".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradegraph_types::{Params, Row};

    use crate::error::StoreError;

    struct StaticStore(Vec<Row>);

    impl PermissionStore for StaticStore {
        fn execute(&self, query: &str, _params: &Params) -> std::result::Result<Vec<Row>, StoreError> {
            assert_eq!(query, ALL_PERMISSIONS_QUERY);
            Ok(self.0.clone())
        }
    }

    fn permission(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Scalar::Text((*v).to_string())))
            .collect()
    }

    #[test]
    fn test_resource_patterns() {
        let mut manager = PolicyManager::new(StaticStore(vec![
            permission(&[
                ("name", "geo:read"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
            ]),
            permission(&[
                ("name", "trade:read"),
                ("resource", "edge"),
                ("action", "read"),
                ("edge_type", "TRADES_WITH"),
            ]),
            permission(&[
                ("name", "bs:hide-price"),
                ("resource", "property"),
                ("action", "read"),
                ("node_label", "BalanceSheet"),
                ("property_name", "price"),
                ("grant_type", "DENY"),
            ]),
            permission(&[
                ("name", "any:hide-notes"),
                ("resource", "property"),
                ("action", "read"),
                ("property_name", "confidential_notes"),
                ("grant_type", "DENY"),
            ]),
        ]));

        let policy = manager.load_policy().unwrap();
        let patterns: Vec<&str> = policy
            .rules
            .iter()
            .map(|r| r.resource_pattern.as_str())
            .collect();
        assert_eq!(
            patterns,
            vec![
                "Geography",
                "TRADES_WITH",
                "BalanceSheet.price",
                "*.confidential_notes",
            ]
        );
    }

    #[test]
    fn test_conditions_merge_filter_and_attributes() {
        let mut manager = PolicyManager::new(StaticStore(vec![permission(&[
            ("name", "geo:eu-recent"),
            ("resource", "node"),
            ("action", "read"),
            ("node_label", "Geography"),
            ("property_filter", r#"{"region": "EU"}"#),
            ("attribute_conditions", "n.year >= 2024"),
        ])]));

        let policy = manager.load_policy().unwrap();
        let conditions = policy.rules[0].conditions.as_ref().unwrap();
        assert_eq!(conditions.node_label.as_deref(), Some("Geography"));
        assert_eq!(
            conditions.property_filter.as_ref().unwrap()["region"],
            Scalar::Text("EU".into())
        );
        assert_eq!(conditions.attribute_conditions.as_deref(), Some("n.year >= 2024"));
    }

    #[test]
    fn test_unconditional_rule_has_no_conditions() {
        let mut manager = PolicyManager::new(StaticStore(vec![permission(&[
            ("name", "open:read"),
            ("resource", "node"),
            ("action", "read"),
        ])]));
        let policy = manager.load_policy().unwrap();
        assert_eq!(policy.rules[0].resource_pattern, "node");
        assert!(policy.rules[0].conditions.is_none());
    }

    #[test]
    fn test_malformed_filter_recorded_and_dropped() {
        let mut manager = PolicyManager::new(StaticStore(vec![
            permission(&[
                ("name", "geo:broken"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
                ("property_filter", "{not json"),
            ]),
            permission(&[
                ("name", "geo:ok"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
            ]),
        ]));

        let policy = manager.load_policy().unwrap();
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].resource_pattern, "Geography");
        assert_eq!(manager.diagnostics().len(), 1);
        assert_eq!(manager.diagnostics()[0].permission, "geo:broken");
    }

    #[test]
    fn test_cache_lifecycle() {
        let mut manager = PolicyManager::new(StaticStore(vec![]));
        assert!(manager.cached_policy().is_none());
        manager.load_policy().unwrap();
        assert!(manager.cached_policy().is_some());
        manager.clear_cache();
        assert!(manager.cached_policy().is_none());
    }

    #[test]
    fn test_deny_grant_parity_with_resolver() {
        // The compiler and the lazy resolver must derive the same
        // grant/deny split from the same permission data.
        let rows = vec![
            permission(&[
                ("name", "geo:eu"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
                ("property_filter", r#"{"region": "EU"}"#),
            ]),
            permission(&[
                ("name", "geo:no-france"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
                ("grant_type", "DENY"),
                ("property_filter", r#"{"name": "France"}"#),
            ]),
        ];

        let mut manager = PolicyManager::new(StaticStore(rows.clone()));
        let policy = manager.load_policy().unwrap();
        let grants = policy
            .rules_for("Geography")
            .filter(|r| r.grant_type == GrantType::Grant)
            .count();
        let denies = policy
            .rules_for("Geography")
            .filter(|r| r.grant_type == GrantType::Deny)
            .count();
        assert_eq!((grants, denies), (1, 1));

        let records: Vec<PermissionRecord> =
            rows.iter().filter_map(PermissionRecord::from_row).collect();
        let rules =
            crate::context::derive_row_rules(&records, "Geography", tradegraph_types::Action::Read);
        let allows = rules
            .iter()
            .filter(|r| r.polarity == crate::permission::Polarity::Allow)
            .count();
        let rule_denies = rules.len() - allows;
        assert_eq!((allows, rule_denies), (grants, denies));
    }
}
