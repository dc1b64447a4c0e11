//! Role model - portal-wide roles carrying an RBAC grants structure.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

/// Reserved role name whose holders may use `admin_override` guards.
pub const ADMIN_ROLE: &str = "admin";

/// Role entity.
///
/// `role_level` orders privilege: lower = more privileged. `grants` maps
/// `resource -> "action:possession" -> allowed field set`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub role_name: String,
    pub role_level: i64,
    pub grants: serde_json::Value,
}

/// Parsed grants: resource -> "action:possession" -> allowed fields.
pub type GrantMap = HashMap<String, HashMap<String, Vec<String>>>;

impl Role {
    /// Parse the JSONB grants column into its typed shape.
    pub fn grant_map(&self) -> Result<GrantMap, serde_json::Error> {
        serde_json::from_value(self.grants.clone())
    }

    /// A role may only be granted by an assigner whose own level is <= the
    /// role's level (one cannot hand out more privilege than one holds).
    pub fn assignable_by(&self, assigner_level: i64) -> bool {
        self.role_level >= assigner_level
    }
}

/// Action half of a grant key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Possession half of a grant key: whether a grant covers only resources
/// the caller owns, or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Possession {
    Own,
    Any,
}

impl Possession {
    pub fn as_str(&self) -> &'static str {
        match self {
            Possession::Own => "own",
            Possession::Any => "any",
        }
    }
}

/// Compose the grant lookup key, e.g. `"read:own"`.
pub fn grant_key(action: Action, possession: Possession) -> String {
    format!("{}:{}", action.as_str(), possession.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grant_map_parses() {
        let role = Role {
            role_name: "developer".into(),
            role_level: 2,
            grants: json!({
                "app": {"read:own": ["*"], "create:own": ["name", "org_id"]}
            }),
        };

        let map = role.grant_map().unwrap();
        assert_eq!(map["app"]["read:own"], vec!["*"]);
        assert_eq!(map["app"]["create:own"], vec!["name", "org_id"]);
    }

    #[test]
    fn test_assignable_by_levels() {
        let developer = Role {
            role_name: "developer".into(),
            role_level: 2,
            grants: json!({}),
        };

        // An admin (level 1) may grant developer; a member (level 3) may not.
        assert!(developer.assignable_by(1));
        assert!(developer.assignable_by(2));
        assert!(!developer.assignable_by(3));
    }

    #[test]
    fn test_grant_key_format() {
        assert_eq!(grant_key(Action::Read, Possession::Own), "read:own");
        assert_eq!(grant_key(Action::Delete, Possession::Any), "delete:any");
    }
}
