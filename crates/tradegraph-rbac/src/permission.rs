//! Permission records and derived rule variants.
//!
//! A raw `Permission` node in the graph is parsed into a
//! [`PermissionRecord`]. Records are then compiled into one of three
//! closed rule variants, checked exhaustively when building query
//! fragments: [`RowRule`], [`PropertyRule`], or [`EdgeRule`]. A permission
//! is scoped to a node label, an edge type, or a (label, property) pair,
//! never more than one at once.

use serde::{Deserialize, Serialize};
use tracing::warn;

use tradegraph_types::Row;

/// What kind of resource a permission is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    /// A node label (row-level scope).
    Node,
    /// A relationship type (edge-level scope).
    Edge,
    /// A (label, property) pair (property-level scope).
    Property,
}

impl Resource {
    /// Parses the store-side resource string.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "node" => Some(Resource::Node),
            "edge" => Some(Resource::Edge),
            "property" => Some(Resource::Property),
            _ => None,
        }
    }
}

/// Whether a permission grants or denies access.
///
/// DENY always wins over GRANT for overlapping scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    /// Positive authorization (the default when the store field is absent).
    #[default]
    Grant,
    /// Negative authorization; overrides any grant.
    Deny,
}

impl GrantType {
    /// Parses the store-side grant type, defaulting to `Grant`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("deny") => GrantType::Deny,
            _ => GrantType::Grant,
        }
    }
}

/// A parsed `Permission` store row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// Permission name, e.g. `"analytics:read"`.
    pub name: String,
    /// Scope kind.
    pub resource: Resource,
    /// Raw action string, e.g. `"read"`.
    pub action: String,
    /// Grant or deny.
    pub grant_type: GrantType,
    /// Node label for node- and property-scoped permissions.
    pub node_label: Option<String>,
    /// Relationship type for edge-scoped permissions.
    pub edge_type: Option<String>,
    /// Property name for property-scoped permissions.
    pub property_name: Option<String>,
    /// Raw JSON object of scalar equality constraints.
    pub property_filter: Option<String>,
    /// Raw predicate text over the generic variable `n`.
    pub attribute_conditions: Option<String>,
}

impl PermissionRecord {
    /// Parses a store row into a record.
    ///
    /// Returns `None` (with a logged diagnostic) when the row is missing a
    /// name or carries an unknown resource kind; other permissions in the
    /// same result set are unaffected.
    pub fn from_row(row: &Row) -> Option<Self> {
        let name = row.get_text("name")?.to_string();

        let Some(resource) = row.get_text("resource").and_then(Resource::parse) else {
            warn!(
                permission = %name,
                resource = ?row.get_text("resource"),
                "Skipping permission with unknown resource kind"
            );
            return None;
        };

        let action = row.get_text("action").unwrap_or("read").to_string();

        Some(Self {
            name,
            resource,
            action,
            grant_type: GrantType::parse(row.get_text("grant_type")),
            node_label: row.get_text("node_label").map(str::to_string),
            edge_type: row.get_text("edge_type").map(str::to_string),
            property_name: row.get_text("property_name").map(str::to_string),
            property_filter: row.get_text("property_filter").map(str::to_string),
            attribute_conditions: row.get_text("attribute_conditions").map(str::to_string),
        })
    }
}

/// Polarity of a derived row rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// ALLOW rules are OR-combined.
    Allow,
    /// DENY rules are OR-combined and negated.
    Deny,
}

/// Derived row-level rule for a node label.
///
/// `predicate` is a Cypher fragment with property references left
/// unqualified (or qualified by the generic variable `n`); the rewriter
/// re-points them at the actual bound variable. `None` means the rule
/// matches every row of the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRule {
    pub label: String,
    pub predicate: Option<String>,
    pub polarity: Polarity,
}

/// Label scope of a property deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelScope {
    /// Applies to one label.
    Label(String),
    /// Applies to every label (`"*"` or absent label in the store).
    Any,
}

impl LabelScope {
    /// Builds a scope from the store-side label field.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("*") | None => LabelScope::Any,
            Some(l) => LabelScope::Label(l.to_string()),
        }
    }

    /// Returns whether this scope covers `label`.
    pub fn covers(&self, label: &str) -> bool {
        match self {
            LabelScope::Any => true,
            LabelScope::Label(l) => l == label,
        }
    }
}

/// Derived property-level deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRule {
    pub label: LabelScope,
    pub property: String,
}

/// Derived edge-level rule. ALLOW-only; edges have no deny semantics in
/// this model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRule {
    pub edge_type: String,
    pub predicate: Option<String>,
}
