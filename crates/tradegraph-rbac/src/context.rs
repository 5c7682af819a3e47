//! Per-request security context and lazy permission resolution.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};
use tradegraph_types::{Action, Params, Principal};

use crate::condition::compile_condition;
use crate::error::{ResolveError, Result};
use crate::permission::{
    EdgeRule, GrantType, LabelScope, PermissionRecord, Polarity, PropertyRule, Resource, RowRule,
};
use crate::store::{PermissionStore, USER_PERMISSIONS_QUERY};

/// Per-request permission resolver.
///
/// Owns the caches of the three derived rule views, keyed by
/// `(scope, action)`. A context lives for exactly one request and is never
/// shared across principals; lazy-load methods take `&mut self` and are the
/// only mutation path. The permission store is consulted at most once per
/// context — the single [`USER_PERMISSIONS_QUERY`] fetch is cached and every
/// derived view is computed from it.
///
/// Resolution fails closed: a store failure surfaces as
/// [`ResolveError::PermissionResolution`] instead of degrading to
/// unfiltered access.
pub struct SecurityContext<S> {
    principal: Principal,
    store: S,
    permissions: Option<Vec<PermissionRecord>>,
    row_cache: HashMap<(String, Action), Vec<String>>,
    property_cache: HashMap<(String, Action), BTreeSet<String>>,
    edge_cache: HashMap<(String, Action), Vec<String>>,
}

impl<S: PermissionStore> SecurityContext<S> {
    /// Creates a context for one request.
    pub fn new(principal: Principal, store: S) -> Self {
        Self {
            principal,
            store,
            permissions: None,
            row_cache: HashMap::new(),
            property_cache: HashMap::new(),
            edge_cache: HashMap::new(),
        }
    }

    /// Returns the principal this context was created for.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Returns whether the principal bypasses all filtering.
    pub fn is_superuser(&self) -> bool {
        self.principal.superuser
    }

    /// Returns whether the principal carries an identity.
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_authenticated()
    }

    /// Returns the principal's username, if authenticated.
    pub fn username(&self) -> Option<&str> {
        self.principal.username.as_deref()
    }

    /// Returns the principal's role names.
    pub fn roles(&self) -> &[String] {
        &self.principal.roles
    }

    /// Returns whether the principal holds the named role.
    ///
    /// Superusers implicitly hold the `admin` role.
    pub fn has_role(&self, role: &str) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        if self.principal.superuser && role == "admin" {
            return true;
        }
        self.principal.roles.iter().any(|r| r == role)
    }

    /// Row-filter predicates for `(label, action)`.
    ///
    /// Each returned fragment must be AND-combined into the query's WHERE
    /// clause. Property references are unqualified (or use the generic
    /// variable `n`); the rewriter qualifies them. Superusers get `[]`.
    /// ALLOW rules OR-combine into one fragment; DENY rules OR-combine and
    /// negate into another, and an unconditional DENY denies every row of
    /// the label.
    pub fn get_row_filters(&mut self, label: &str, action: Action) -> Result<Vec<String>> {
        if self.principal.superuser {
            return Ok(Vec::new());
        }
        let key = (label.to_string(), action);
        if let Some(hit) = self.row_cache.get(&key) {
            return Ok(hit.clone());
        }

        self.ensure_loaded()?;
        let records = self.permissions.as_deref().unwrap_or_default();
        let rules = derive_row_rules(records, label, action);
        let fragments = combine_row_rules(&rules);

        debug!(
            label,
            action = %action,
            rules = rules.len(),
            fragments = fragments.len(),
            "Resolved row filters"
        );
        self.row_cache.insert(key, fragments.clone());
        Ok(fragments)
    }

    /// Property names denied for `(label, action)`.
    ///
    /// The union of DENY property permissions scoped to `label` or to the
    /// wildcard label. Superusers get the empty set.
    pub fn get_denied_properties(
        &mut self,
        label: &str,
        action: Action,
    ) -> Result<BTreeSet<String>> {
        if self.principal.superuser {
            return Ok(BTreeSet::new());
        }
        let key = (label.to_string(), action);
        if let Some(hit) = self.property_cache.get(&key) {
            return Ok(hit.clone());
        }

        self.ensure_loaded()?;
        let records = self.permissions.as_deref().unwrap_or_default();
        let denied: BTreeSet<String> = derive_property_rules(records, action)
            .into_iter()
            .filter(|rule| rule.label.covers(label))
            .map(|rule| rule.property)
            .collect();

        debug!(label, action = %action, denied = denied.len(), "Resolved denied properties");
        self.property_cache.insert(key, denied.clone());
        Ok(denied)
    }

    /// Edge-filter predicates for `(edge_type, action)`.
    ///
    /// ALLOW-only: DENY permissions on edges have no semantics in this
    /// model and are ignored. An unconditional grant lifts all restriction
    /// for the edge type; so does the absence of any matching permission.
    pub fn get_edge_filters(&mut self, edge_type: &str, action: Action) -> Result<Vec<String>> {
        if self.principal.superuser {
            return Ok(Vec::new());
        }
        let key = (edge_type.to_string(), action);
        if let Some(hit) = self.edge_cache.get(&key) {
            return Ok(hit.clone());
        }

        self.ensure_loaded()?;
        let records = self.permissions.as_deref().unwrap_or_default();
        let rules = derive_edge_rules(records, edge_type, action);
        let fragments = combine_edge_rules(&rules);

        debug!(edge_type, action = %action, fragments = fragments.len(), "Resolved edge filters");
        self.edge_cache.insert(key, fragments.clone());
        Ok(fragments)
    }

    /// Names of every permission reachable through the principal's roles.
    pub fn permission_names(&mut self) -> Result<BTreeSet<String>> {
        self.ensure_loaded()?;
        Ok(self
            .permissions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|r| r.name.clone())
            .collect())
    }

    /// Returns whether the principal holds `permission`
    /// (`"resource:action"` form, with `*:*` and `resource:*` wildcards).
    pub fn has_permission(&mut self, permission: &str) -> Result<bool> {
        if !self.is_authenticated() {
            return Ok(false);
        }
        if self.principal.superuser {
            return Ok(true);
        }

        let names = self.permission_names()?;
        if names.contains(permission) || names.contains("*:*") {
            return Ok(true);
        }
        let resource = permission.split(':').next().unwrap_or(permission);
        Ok(names.contains(&format!("{resource}:*")))
    }

    /// Fails with [`ResolveError::PermissionDenied`] unless the principal
    /// holds `permission`.
    pub fn require_permission(&mut self, permission: &str) -> Result<()> {
        if self.has_permission(permission)? {
            Ok(())
        } else {
            warn!(
                user = %self.principal.display_name(),
                permission,
                "Permission check failed"
            );
            Err(ResolveError::PermissionDenied {
                username: self.principal.display_name().to_string(),
                permission: permission.to_string(),
            })
        }
    }

    /// Fails with [`ResolveError::AuthenticationRequired`] for anonymous
    /// principals.
    pub fn require_authentication(&self) -> Result<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ResolveError::AuthenticationRequired)
        }
    }

    /// Loads the principal's permissions from the store, once per context.
    ///
    /// Superusers and anonymous principals resolve to the empty set without
    /// touching the store.
    fn ensure_loaded(&mut self) -> Result<()> {
        if self.permissions.is_some() {
            return Ok(());
        }

        let Some(username) = self.principal.username.clone() else {
            self.permissions = Some(Vec::new());
            return Ok(());
        };
        if self.principal.superuser {
            self.permissions = Some(Vec::new());
            return Ok(());
        }

        let mut params = Params::new();
        params.insert("username", username.as_str());

        let rows = self
            .store
            .execute(USER_PERMISSIONS_QUERY, &params)
            .map_err(|source| {
                warn!(
                    user = %username,
                    error = %source,
                    "Permission store failure; failing closed"
                );
                ResolveError::PermissionResolution { username: username.clone(), source }
            })?;

        let records: Vec<PermissionRecord> =
            rows.iter().filter_map(PermissionRecord::from_row).collect();
        debug!(user = %username, permissions = records.len(), "Loaded permissions");
        self.permissions = Some(records);
        Ok(())
    }
}

/// Derives the row rules applicable to `(label, action)`.
///
/// Permissions with malformed filters are excluded entirely, with a logged
/// diagnostic; dropping only the filter would widen the rule's scope.
pub fn derive_row_rules(
    records: &[PermissionRecord],
    label: &str,
    action: Action,
) -> Vec<RowRule> {
    let mut rules = Vec::new();
    for record in records {
        if record.resource != Resource::Node
            || record.node_label.as_deref() != Some(label)
            || !action.matches(&record.action)
        {
            continue;
        }
        match compile_condition(record) {
            Ok(predicate) => rules.push(RowRule {
                label: label.to_string(),
                predicate,
                polarity: match record.grant_type {
                    GrantType::Grant => Polarity::Allow,
                    GrantType::Deny => Polarity::Deny,
                },
            }),
            Err(diag) => warn!(error = %diag, "Dropping permission with malformed filter"),
        }
    }
    rules
}

/// Folds row rules into the fragments `get_row_filters` returns.
///
/// The combined semantics are
/// `(no ALLOW rules OR any ALLOW matches) AND NOT (any DENY matches)`.
pub fn combine_row_rules(rules: &[RowRule]) -> Vec<String> {
    let mut allow: Vec<&str> = Vec::new();
    let mut deny: Vec<&str> = Vec::new();
    let mut allow_unconditional = false;
    let mut deny_unconditional = false;

    for rule in rules {
        match (rule.polarity, rule.predicate.as_deref()) {
            (Polarity::Allow, Some(p)) => allow.push(p),
            (Polarity::Allow, None) => allow_unconditional = true,
            (Polarity::Deny, Some(p)) => deny.push(p),
            (Polarity::Deny, None) => deny_unconditional = true,
        }
    }

    let mut fragments = Vec::new();
    if !allow_unconditional && !allow.is_empty() {
        fragments.push(join_disjunction(&allow));
    }
    if deny_unconditional {
        // An unconditional deny hides every row of the label.
        fragments.push("false".to_string());
    } else if !deny.is_empty() {
        fragments.push(format!("NOT ({})", join_disjunction(&deny)));
    }
    fragments
}

/// Derives all property deny rules applicable to `action`.
pub fn derive_property_rules(records: &[PermissionRecord], action: Action) -> Vec<PropertyRule> {
    let mut rules = Vec::new();
    for record in records {
        if record.resource != Resource::Property
            || record.grant_type != GrantType::Deny
            || !action.matches(&record.action)
        {
            continue;
        }
        let Some(property) = record.property_name.clone() else {
            warn!(permission = %record.name, "Property permission without property_name");
            continue;
        };
        rules.push(PropertyRule {
            label: LabelScope::from_label(record.node_label.as_deref()),
            property,
        });
    }
    rules
}

/// Derives the edge rules applicable to `(edge_type, action)`.
///
/// DENY edge permissions are ignored; edges carry ALLOW semantics only.
pub fn derive_edge_rules(
    records: &[PermissionRecord],
    edge_type: &str,
    action: Action,
) -> Vec<EdgeRule> {
    let mut rules = Vec::new();
    for record in records {
        if record.resource != Resource::Edge
            || record.edge_type.as_deref() != Some(edge_type)
            || !action.matches(&record.action)
        {
            continue;
        }
        if record.grant_type == GrantType::Deny {
            debug!(permission = %record.name, "Edge permissions have no deny semantics; ignoring");
            continue;
        }
        match compile_condition(record) {
            Ok(predicate) => rules.push(EdgeRule {
                edge_type: edge_type.to_string(),
                predicate,
            }),
            Err(diag) => warn!(error = %diag, "Dropping permission with malformed filter"),
        }
    }
    rules
}

/// Folds edge rules into filter fragments. An unconditional grant (or no
/// rule at all) imposes no restriction.
pub fn combine_edge_rules(rules: &[EdgeRule]) -> Vec<String> {
    let mut predicates: Vec<&str> = Vec::new();
    for rule in rules {
        match rule.predicate.as_deref() {
            Some(p) => predicates.push(p),
            None => return Vec::new(),
        }
    }
    if predicates.is_empty() {
        Vec::new()
    } else {
        vec![join_disjunction(&predicates)]
    }
}

fn join_disjunction(predicates: &[&str]) -> String {
    if predicates.len() == 1 {
        predicates[0].to_string()
    } else {
        predicates
            .iter()
            .map(|p| format!("({p})"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use proptest::prelude::*;
    use tradegraph_types::{Row, Scalar};

    use crate::error::StoreError;

    /// Store that serves a fixed permission set and counts executions.
    struct StaticStore {
        rows: Vec<Row>,
        executions: Cell<usize>,
    }

    impl StaticStore {
        fn new(rows: Vec<Row>) -> Self {
            Self {
                rows,
                executions: Cell::new(0),
            }
        }
    }

    impl PermissionStore for StaticStore {
        fn execute(
            &self,
            query: &str,
            params: &Params,
        ) -> std::result::Result<Vec<Row>, StoreError> {
            assert_eq!(query, USER_PERMISSIONS_QUERY);
            assert!(params.contains_key("username"));
            self.executions.set(self.executions.get() + 1);
            Ok(self.rows.clone())
        }
    }

    /// Store that always fails.
    struct DownStore;

    impl PermissionStore for DownStore {
        fn execute(
            &self,
            _query: &str,
            _params: &Params,
        ) -> std::result::Result<Vec<Row>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn permission(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Scalar::Text((*v).to_string())))
            .collect()
    }

    fn context_with(rows: Vec<Row>) -> SecurityContext<StaticStore> {
        SecurityContext::new(
            Principal::new("emma_restricted", vec!["trader".into()]),
            StaticStore::new(rows),
        )
    }

    #[test]
    fn test_superuser_resolves_empty_without_store() {
        // DownStore fails on contact, so any Ok result proves the bypass.
        let mut ctx = SecurityContext::new(Principal::superuser("admin"), DownStore);
        assert!(ctx.get_row_filters("Geography", Action::Read).unwrap().is_empty());
        assert!(ctx
            .get_denied_properties("Geography", Action::Read)
            .unwrap()
            .is_empty());
        assert!(ctx.get_edge_filters("TRADES_WITH", Action::Read).unwrap().is_empty());
    }

    #[test]
    fn test_store_failure_fails_closed() {
        let mut ctx = SecurityContext::new(
            Principal::new("emma_restricted", vec![]),
            DownStore,
        );
        let err = ctx.get_row_filters("Geography", Action::Read).unwrap_err();
        assert!(matches!(err, ResolveError::PermissionResolution { .. }));
    }

    #[test]
    fn test_anonymous_resolves_empty_without_store() {
        let mut ctx = SecurityContext::new(Principal::anonymous(), DownStore);
        assert!(ctx.get_row_filters("Geography", Action::Read).unwrap().is_empty());
    }

    #[test]
    fn test_deny_row_filter_is_negated() {
        let mut ctx = context_with(vec![permission(&[
            ("name", "geo:deny-france"),
            ("resource", "node"),
            ("action", "read"),
            ("node_label", "Geography"),
            ("grant_type", "DENY"),
            ("property_filter", r#"{"name": "France"}"#),
        ])]);
        let filters = ctx.get_row_filters("Geography", Action::Read).unwrap();
        assert_eq!(filters, vec!["NOT (name = 'France')".to_string()]);
    }

    #[test]
    fn test_allow_rules_or_combined() {
        let mut ctx = context_with(vec![
            permission(&[
                ("name", "geo:eu"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
                ("property_filter", r#"{"region": "EU"}"#),
            ]),
            permission(&[
                ("name", "geo:recent"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
                ("attribute_conditions", "n.year >= 2024"),
            ]),
        ]);
        let filters = ctx.get_row_filters("Geography", Action::Read).unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0], "(region = 'EU') OR ((n.year >= 2024))");
    }

    #[test]
    fn test_allow_and_deny_produce_two_fragments() {
        let mut ctx = context_with(vec![
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
        ]);
        let filters = ctx.get_row_filters("Geography", Action::Read).unwrap();
        assert_eq!(
            filters,
            vec![
                "region = 'EU'".to_string(),
                "NOT (name = 'France')".to_string(),
            ]
        );
    }

    #[test]
    fn test_unconditional_allow_imposes_no_restriction() {
        let mut ctx = context_with(vec![permission(&[
            ("name", "geo:all"),
            ("resource", "node"),
            ("action", "read"),
            ("node_label", "Geography"),
        ])]);
        assert!(ctx.get_row_filters("Geography", Action::Read).unwrap().is_empty());
    }

    #[test]
    fn test_unconditional_deny_hides_every_row() {
        let mut ctx = context_with(vec![permission(&[
            ("name", "geo:none"),
            ("resource", "node"),
            ("action", "read"),
            ("node_label", "Geography"),
            ("grant_type", "DENY"),
        ])]);
        let filters = ctx.get_row_filters("Geography", Action::Read).unwrap();
        assert_eq!(filters, vec!["false".to_string()]);
    }

    #[test]
    fn test_no_matching_permissions_means_no_restriction() {
        let mut ctx = context_with(vec![permission(&[
            ("name", "bs:read"),
            ("resource", "node"),
            ("action", "read"),
            ("node_label", "BalanceSheet"),
            ("property_filter", r#"{"season": "2024"}"#),
        ])]);
        assert!(ctx.get_row_filters("Geography", Action::Read).unwrap().is_empty());
    }

    #[test]
    fn test_action_mismatch_excludes_rule() {
        let mut ctx = context_with(vec![permission(&[
            ("name", "geo:write"),
            ("resource", "node"),
            ("action", "write"),
            ("node_label", "Geography"),
            ("grant_type", "DENY"),
        ])]);
        assert!(ctx.get_row_filters("Geography", Action::Read).unwrap().is_empty());
        assert_eq!(
            ctx.get_row_filters("Geography", Action::Write).unwrap(),
            vec!["false".to_string()]
        );
    }

    #[test]
    fn test_malformed_filter_drops_only_that_permission() {
        let mut ctx = context_with(vec![
            permission(&[
                ("name", "geo:broken"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
                ("property_filter", "{not json"),
            ]),
            permission(&[
                ("name", "geo:no-france"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Geography"),
                ("grant_type", "DENY"),
                ("property_filter", r#"{"name": "France"}"#),
            ]),
        ]);
        let filters = ctx.get_row_filters("Geography", Action::Read).unwrap();
        assert_eq!(filters, vec!["NOT (name = 'France')".to_string()]);
    }

    #[test]
    fn test_denied_properties_union_with_wildcard() {
        let mut ctx = context_with(vec![
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
                ("node_label", "*"),
                ("property_name", "confidential_notes"),
                ("grant_type", "DENY"),
            ]),
        ]);
        let denied = ctx.get_denied_properties("BalanceSheet", Action::Read).unwrap();
        assert!(denied.contains("price"));
        assert!(denied.contains("confidential_notes"));

        let other = ctx.get_denied_properties("Geography", Action::Read).unwrap();
        assert!(!other.contains("price"));
        assert!(other.contains("confidential_notes"));
    }

    #[test]
    fn test_grant_property_permission_never_denies() {
        let mut ctx = context_with(vec![permission(&[
            ("name", "bs:show-price"),
            ("resource", "property"),
            ("action", "read"),
            ("node_label", "BalanceSheet"),
            ("property_name", "price"),
        ])]);
        assert!(ctx
            .get_denied_properties("BalanceSheet", Action::Read)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_edge_filters_allow_only() {
        let mut ctx = context_with(vec![
            permission(&[
                ("name", "trade:wheat"),
                ("resource", "edge"),
                ("action", "read"),
                ("edge_type", "TRADES_WITH"),
                ("property_filter", r#"{"commodity": "Wheat"}"#),
            ]),
            permission(&[
                ("name", "trade:deny"),
                ("resource", "edge"),
                ("action", "read"),
                ("edge_type", "TRADES_WITH"),
                ("grant_type", "DENY"),
                ("property_filter", r#"{"commodity": "Corn"}"#),
            ]),
        ]);
        let filters = ctx.get_edge_filters("TRADES_WITH", Action::Read).unwrap();
        assert_eq!(filters, vec!["commodity = 'Wheat'".to_string()]);
    }

    #[test]
    fn test_unconditional_edge_grant_lifts_restriction() {
        let mut ctx = context_with(vec![
            permission(&[
                ("name", "trade:wheat"),
                ("resource", "edge"),
                ("action", "read"),
                ("edge_type", "TRADES_WITH"),
                ("property_filter", r#"{"commodity": "Wheat"}"#),
            ]),
            permission(&[
                ("name", "trade:all"),
                ("resource", "edge"),
                ("action", "read"),
                ("edge_type", "TRADES_WITH"),
            ]),
        ]);
        assert!(ctx.get_edge_filters("TRADES_WITH", Action::Read).unwrap().is_empty());
    }

    #[test]
    fn test_store_consulted_once_per_context() {
        let store = StaticStore::new(vec![permission(&[
            ("name", "geo:no-france"),
            ("resource", "node"),
            ("action", "read"),
            ("node_label", "Geography"),
            ("grant_type", "DENY"),
            ("property_filter", r#"{"name": "France"}"#),
        ])]);
        let mut ctx = SecurityContext::new(Principal::new("emma_restricted", vec![]), store);

        ctx.get_row_filters("Geography", Action::Read).unwrap();
        ctx.get_row_filters("Geography", Action::Read).unwrap();
        ctx.get_row_filters("BalanceSheet", Action::Read).unwrap();
        ctx.get_denied_properties("Geography", Action::Read).unwrap();
        ctx.get_edge_filters("TRADES_WITH", Action::Read).unwrap();

        assert_eq!(ctx.store.executions.get(), 1);
    }

    #[test]
    fn test_has_permission_wildcards() {
        let mut ctx = context_with(vec![
            permission(&[
                ("name", "analytics:read"),
                ("resource", "node"),
                ("action", "read"),
                ("node_label", "Indicator"),
            ]),
            permission(&[
                ("name", "ingestion:*"),
                ("resource", "node"),
                ("action", "write"),
                ("node_label", "Document"),
            ]),
        ]);
        assert!(ctx.has_permission("analytics:read").unwrap());
        assert!(ctx.has_permission("ingestion:write").unwrap());
        assert!(!ctx.has_permission("admin:manage").unwrap());

        let mut root = SecurityContext::new(Principal::superuser("admin"), DownStore);
        assert!(root.has_permission("anything:at-all").unwrap());

        let mut anon = SecurityContext::new(Principal::anonymous(), DownStore);
        assert!(!anon.has_permission("analytics:read").unwrap());
    }

    #[test]
    fn test_require_permission_denied() {
        let mut ctx = context_with(vec![]);
        let err = ctx.require_permission("analytics:read").unwrap_err();
        assert!(matches!(err, ResolveError::PermissionDenied { .. }));
    }

    #[test]
    fn test_require_authentication() {
        let anon = SecurityContext::new(Principal::anonymous(), DownStore);
        assert!(matches!(
            anon.require_authentication().unwrap_err(),
            ResolveError::AuthenticationRequired
        ));

        let ctx = context_with(vec![]);
        assert!(ctx.require_authentication().is_ok());
    }

    #[test]
    fn test_has_role() {
        let ctx = context_with(vec![]);
        assert!(ctx.has_role("trader"));
        assert!(!ctx.has_role("admin"));

        let root = SecurityContext::new(Principal::superuser("admin"), DownStore);
        assert!(root.has_role("admin"));
    }

    proptest! {
        /// Row-rule folding emits at most one allow fragment and one deny
        /// fragment, every conditional predicate survives into its
        /// fragment, and deny predicates always end up negated.
        #[test]
        fn prop_combine_row_rules_shape(
            allow in proptest::collection::vec("[a-z]{1,8} = '[A-Z][a-z]{1,8}'", 0..4),
            deny in proptest::collection::vec("[a-z]{1,8} = '[A-Z][a-z]{1,8}'", 0..4),
        ) {
            let rules: Vec<RowRule> = allow
                .iter()
                .map(|p| RowRule {
                    label: "Geography".into(),
                    predicate: Some(p.clone()),
                    polarity: Polarity::Allow,
                })
                .chain(deny.iter().map(|p| RowRule {
                    label: "Geography".into(),
                    predicate: Some(p.clone()),
                    polarity: Polarity::Deny,
                }))
                .collect();

            let fragments = combine_row_rules(&rules);
            prop_assert!(fragments.len() <= 2);
            prop_assert!(fragments.is_empty() == (allow.is_empty() && deny.is_empty()));

            if !allow.is_empty() {
                for p in &allow {
                    prop_assert!(fragments[0].contains(p.as_str()));
                }
            }
            if !deny.is_empty() {
                let negated = fragments.last().unwrap();
                prop_assert!(negated.starts_with("NOT ("));
                for p in &deny {
                    prop_assert!(negated.contains(p.as_str()));
                }
            }
        }
    }
}
