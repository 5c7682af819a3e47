//! Compilation of permission metadata into predicate fragments.
//!
//! A permission's `property_filter` (a JSON object of scalar equality
//! constraints) and `attribute_conditions` (raw predicate text over the
//! generic variable `n`) are merged into a single Cypher fragment. The
//! fragment leaves property references unqualified; the query rewriter
//! qualifies them with the bound variable at injection time.

use thiserror::Error;
use tradegraph_types::Scalar;

use crate::permission::PermissionRecord;

/// A permission whose `property_filter` could not be parsed.
///
/// The offending permission contributes no rule at all: dropping only the
/// filter would silently widen a grant's scope, so the whole permission is
/// excluded and the diagnostic recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission '{permission}' has malformed property_filter: {detail}")]
pub struct MalformedFilter {
    /// Name of the offending permission.
    pub permission: String,
    /// Why parsing failed.
    pub detail: String,
}

/// Compiles a permission's filter metadata into one predicate fragment.
///
/// Returns `Ok(None)` for an unconditional permission (no filter, no
/// attribute conditions). Equality constraints from `property_filter` are
/// AND-joined in key order; `attribute_conditions` text is appended
/// verbatim, parenthesized.
pub fn compile_condition(record: &PermissionRecord) -> Result<Option<String>, MalformedFilter> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(raw) = record.property_filter.as_deref() {
        let object: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| MalformedFilter {
                permission: record.name.clone(),
                detail: e.to_string(),
            })?;

        let Some(map) = object.as_object() else {
            return Err(MalformedFilter {
                permission: record.name.clone(),
                detail: format!("expected a JSON object, got: {object}"),
            });
        };

        for (key, value) in map {
            let Some(scalar) = Scalar::from_json(value) else {
                return Err(MalformedFilter {
                    permission: record.name.clone(),
                    detail: format!("value for '{key}' is not a scalar"),
                });
            };
            parts.push(format!("{key} = {scalar}"));
        }
    }

    if let Some(attr) = record.attribute_conditions.as_deref() {
        let attr = attr.trim();
        if !attr.is_empty() {
            parts.push(format!("({attr})"));
        }
    }

    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(" AND ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{GrantType, Resource};

    fn node_permission(filter: Option<&str>, attrs: Option<&str>) -> PermissionRecord {
        PermissionRecord {
            name: "geo:read".into(),
            resource: Resource::Node,
            action: "read".into(),
            grant_type: GrantType::Grant,
            node_label: Some("Geography".into()),
            edge_type: None,
            property_name: None,
            property_filter: filter.map(str::to_string),
            attribute_conditions: attrs.map(str::to_string),
        }
    }

    #[test]
    fn test_unconditional_permission_compiles_to_none() {
        assert_eq!(compile_condition(&node_permission(None, None)).unwrap(), None);
    }

    #[test]
    fn test_property_filter_equality() {
        let perm = node_permission(Some(r#"{"name": "France"}"#), None);
        assert_eq!(
            compile_condition(&perm).unwrap().as_deref(),
            Some("name = 'France'")
        );
    }

    #[test]
    fn test_property_filter_multiple_keys_joined_in_key_order() {
        let perm = node_permission(Some(r#"{"level": 0, "country": "France"}"#), None);
        assert_eq!(
            compile_condition(&perm).unwrap().as_deref(),
            Some("country = 'France' AND level = 0")
        );
    }

    #[test]
    fn test_attribute_conditions_appended_verbatim() {
        let perm = node_permission(Some(r#"{"region": "EU"}"#), Some("n.year >= 2024"));
        assert_eq!(
            compile_condition(&perm).unwrap().as_deref(),
            Some("region = 'EU' AND (n.year >= 2024)")
        );
    }

    #[test]
    fn test_attribute_conditions_alone() {
        let perm = node_permission(None, Some("n.year >= 2024"));
        assert_eq!(
            compile_condition(&perm).unwrap().as_deref(),
            Some("(n.year >= 2024)")
        );
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let perm = node_permission(Some("{not json"), None);
        let err = compile_condition(&perm).unwrap_err();
        assert_eq!(err.permission, "geo:read");
    }

    #[test]
    fn test_non_object_filter_is_an_error() {
        let perm = node_permission(Some(r#"["France"]"#), None);
        assert!(compile_condition(&perm).is_err());
    }

    #[test]
    fn test_nested_object_value_is_an_error() {
        let perm = node_permission(Some(r#"{"geo": {"name": "France"}}"#), None);
        let err = compile_condition(&perm).unwrap_err();
        assert!(err.detail.contains("geo"));
    }

    #[test]
    fn test_string_values_are_quoted_and_escaped() {
        let perm = node_permission(Some(r#"{"name": "Cote d'Ivoire"}"#), None);
        assert_eq!(
            compile_condition(&perm).unwrap().as_deref(),
            Some("name = 'Cote d\\'Ivoire'")
        );
    }
}
