//! Request principals and permission actions.

use serde::{Deserialize, Serialize};

/// The caller of a request, resolved at authentication time.
///
/// A principal is immutable for the lifetime of the request it was created
/// for. Role membership is resolved once by the authentication layer; the
/// access-control engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Username, or `None` for the anonymous principal.
    pub username: Option<String>,

    /// Superusers bypass all data-level filtering.
    pub superuser: bool,

    /// Role names this principal holds.
    pub roles: Vec<String>,
}

impl Principal {
    /// Creates an authenticated, non-superuser principal.
    pub fn new(username: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            username: Some(username.into()),
            superuser: false,
            roles,
        }
    }

    /// Creates a superuser principal. Superusers bypass every rewrite stage.
    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            superuser: true,
            roles: Vec::new(),
        }
    }

    /// Creates the anonymous principal (no identity, no roles).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            superuser: false,
            roles: Vec::new(),
        }
    }

    /// Returns whether this principal carries an identity.
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    /// Returns the username, or `"anonymous"` for display purposes.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("anonymous")
    }
}

/// The operation a permission governs.
///
/// Permission records in the store carry the action as a raw string;
/// lookups compare against [`Action::as_str`]. Records with an action the
/// engine does not know about simply never match a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Read / traverse data.
    Read,
    /// Create or update data.
    Write,
    /// Remove data.
    Delete,
}

impl Action {
    /// Returns the store-side string form of this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        }
    }

    /// Returns whether `raw` (a store-side action string) names this action.
    pub fn matches(self, raw: &str) -> bool {
        raw.eq_ignore_ascii_case(self.as_str())
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_authentication() {
        let emma = Principal::new("emma_restricted", vec!["trader".into()]);
        assert!(emma.is_authenticated());
        assert!(!emma.superuser);
        assert_eq!(emma.display_name(), "emma_restricted");

        let anon = Principal::anonymous();
        assert!(!anon.is_authenticated());
        assert_eq!(anon.display_name(), "anonymous");
    }

    #[test]
    fn test_superuser_has_no_roles() {
        let root = Principal::superuser("admin");
        assert!(root.superuser);
        assert!(root.roles.is_empty());
    }

    #[test]
    fn test_action_matches_case_insensitive() {
        assert!(Action::Read.matches("read"));
        assert!(Action::Read.matches("READ"));
        assert!(!Action::Read.matches("write"));
        assert!(Action::Delete.matches("Delete"));
    }
}
