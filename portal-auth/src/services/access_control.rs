//! Access control engine.
//!
//! Authorization is a pure decision over the already-resolved session plus
//! at most one lookup (app ownership). The grant table is loaded once,
//! before the listener binds, into an immutable structure - no request can
//! ever be evaluated against a partially-loaded table.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::middleware::Session;
use crate::models::role::{grant_key, Action, Possession};
use crate::models::Role;
use crate::services::{AuthError, Database};

/// Immutable grant lookup: role -> resource -> "action:possession" ->
/// allowed field set.
#[derive(Debug, Default)]
pub struct GrantTable {
    grants: HashMap<String, HashMap<String, HashMap<String, Vec<String>>>>,
}

impl GrantTable {
    /// Build the table from role rows.
    pub fn from_roles(roles: &[Role]) -> Result<Self, anyhow::Error> {
        let mut grants = HashMap::new();
        for role in roles {
            let map = role.grant_map().map_err(|e| {
                anyhow::anyhow!("Malformed grants for role '{}': {}", role.role_name, e)
            })?;
            grants.insert(role.role_name.clone(), map);
        }
        Ok(Self { grants })
    }

    /// Load every role from the store and build the table.
    pub async fn load(db: &Database) -> Result<Self, AuthError> {
        let roles = db.find_all_roles().await?;
        let table = Self::from_roles(&roles)?;
        tracing::info!(roles = roles.len(), "Grant table loaded");
        Ok(table)
    }

    fn lookup(&self, role: &str, resource: &str, key: &str) -> Option<&Vec<String>> {
        self.grants.get(role)?.get(resource)?.get(key)
    }

    /// Does `role` hold the grant? An `any` grant implies the `own`
    /// variant of the same action.
    pub fn is_granted(
        &self,
        role: &str,
        resource: &str,
        action: Action,
        possession: Possession,
    ) -> bool {
        if self
            .lookup(role, resource, &grant_key(action, Possession::Any))
            .is_some()
        {
            return true;
        }
        possession == Possession::Own
            && self
                .lookup(role, resource, &grant_key(action, Possession::Own))
                .is_some()
    }

    /// The field set attached to a grant, preferring the exact possession.
    pub fn allowed_fields(
        &self,
        role: &str,
        resource: &str,
        action: Action,
        possession: Possession,
    ) -> Option<&[String]> {
        self.lookup(role, resource, &grant_key(action, possession))
            .or_else(|| self.lookup(role, resource, &grant_key(action, Possession::Any)))
            .map(|fields| fields.as_slice())
    }
}

/// The one lookup ownership evaluation may need: which organization owns
/// an app. Organization and profile ownership come from the resolved
/// session itself.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    async fn app_owner_org(&self, app_id: Uuid) -> Result<Option<Uuid>, AuthError>;
}

#[async_trait]
impl OwnershipStore for Database {
    async fn app_owner_org(&self, app_id: Uuid) -> Result<Option<Uuid>, AuthError> {
        self.find_app_owner_org(app_id).await
    }
}

/// Declaration a protected route supplies to the engine.
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    pub resource: &'static str,
    pub action: Action,
    pub possession: Possession,
    pub admin_override: bool,
}

impl Guard {
    pub fn new(resource: &'static str, action: Action, possession: Possession) -> Self {
        Self {
            resource,
            action,
            possession,
            admin_override: false,
        }
    }

    /// Allow the reserved admin role through regardless of ownership.
    pub fn with_admin_override(mut self) -> Self {
        self.admin_override = true;
        self
    }
}

/// The resource instance an `own`-possession check is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum OwnershipRef {
    Organization(Uuid),
    App(Uuid),
    Profile(Uuid),
}

/// Evaluates `(session, guard, target)` to allow or deny. Denials are
/// uniform - the caller learns nothing about which step failed.
#[derive(Clone)]
pub struct AccessControlEngine {
    table: Arc<GrantTable>,
    store: Arc<dyn OwnershipStore>,
}

impl AccessControlEngine {
    pub fn new(table: Arc<GrantTable>, store: Arc<dyn OwnershipStore>) -> Self {
        Self { table, store }
    }

    pub async fn authorize(
        &self,
        session: &Session,
        guard: &Guard,
        target: Option<OwnershipRef>,
    ) -> Result<(), AuthError> {
        let Some(role) = &session.active_role else {
            return Err(AuthError::Forbidden);
        };

        if !self
            .table
            .is_granted(&role.name, guard.resource, guard.action, guard.possession)
        {
            return Err(AuthError::Forbidden);
        }

        if guard.admin_override && session.is_admin() {
            return Ok(());
        }

        if guard.possession == Possession::Own {
            let owned = match target {
                Some(OwnershipRef::Organization(org_id)) => {
                    session.organizations.iter().any(|m| m.org_id == org_id)
                }
                Some(OwnershipRef::App(app_id)) => {
                    match self.store.app_owner_org(app_id).await? {
                        Some(owner_org) => {
                            session.organizations.iter().any(|m| m.org_id == owner_org)
                        }
                        None => false,
                    }
                }
                Some(OwnershipRef::Profile(identity_id)) => {
                    session.identity.identity_id == identity_id
                }
                // An own-possession guard with no target cannot prove
                // ownership.
                None => false,
            };

            if !owned {
                return Err(AuthError::Forbidden);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RoleInfo;
    use crate::models::{MembershipInfo, PublicProfile};
    use chrono::Utc;
    use serde_json::json;

    struct StaticStore(HashMap<Uuid, Uuid>);

    #[async_trait]
    impl OwnershipStore for StaticStore {
        async fn app_owner_org(&self, app_id: Uuid) -> Result<Option<Uuid>, AuthError> {
            Ok(self.0.get(&app_id).copied())
        }
    }

    fn roles() -> Vec<Role> {
        vec![
            Role {
                role_name: "admin".into(),
                role_level: 1,
                grants: json!({
                    "app": {"read:any": ["*"], "update:any": ["*"]},
                    "organization": {"update:any": ["*"]}
                }),
            },
            Role {
                role_name: "developer".into(),
                role_level: 2,
                grants: json!({
                    "app": {"read:own": ["*"], "update:own": ["name"]},
                    "organization": {"update:own": ["*"]}
                }),
            },
        ]
    }

    fn session(role: Option<&str>, level: i64, org_id: Uuid) -> Session {
        Session {
            identity: PublicProfile {
                identity_id: Uuid::new_v4(),
                email: "dev@example.com".into(),
                display_name: None,
                federated: false,
                pending_activation: false,
                last_login_utc: None,
                created_utc: Utc::now(),
            },
            organizations: vec![MembershipInfo {
                org_id,
                org_name: "Acme".into(),
                role_name: role.unwrap_or("member").to_string(),
                role_level: level,
                is_current: true,
            }],
            active_role: role.map(|name| RoleInfo {
                name: name.to_string(),
                level,
            }),
        }
    }

    fn engine(apps: HashMap<Uuid, Uuid>) -> AccessControlEngine {
        let table = GrantTable::from_roles(&roles()).unwrap();
        AccessControlEngine::new(Arc::new(table), Arc::new(StaticStore(apps)))
    }

    #[tokio::test]
    async fn test_no_active_role_is_denied() {
        let engine = engine(HashMap::new());
        let session = session(None, 3, Uuid::new_v4());
        let guard = Guard::new("app", Action::Read, Possession::Own);

        assert!(engine.authorize(&session, &guard, None).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_grant_is_denied() {
        let engine = engine(HashMap::new());
        let org = Uuid::new_v4();
        let session = session(Some("developer"), 2, org);
        let guard = Guard::new("app", Action::Delete, Possession::Own);

        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::Organization(org)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_developer_reads_own_org_app() {
        let org = Uuid::new_v4();
        let app = Uuid::new_v4();
        let engine = engine(HashMap::from([(app, org)]));
        let session = session(Some("developer"), 2, org);
        let guard = Guard::new("app", Action::Read, Possession::Own);

        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::App(app)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_developer_denied_for_foreign_org_app() {
        let org = Uuid::new_v4();
        let app = Uuid::new_v4();
        // The app belongs to a different organization.
        let engine = engine(HashMap::from([(app, Uuid::new_v4())]));
        let session = session(Some("developer"), 2, org);
        let guard = Guard::new("app", Action::Read, Possession::Own);

        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::App(app)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_any_grant_satisfies_own_possession() {
        let org = Uuid::new_v4();
        let app = Uuid::new_v4();
        let engine = engine(HashMap::from([(app, org)]));
        // Admin only holds read:any; an own-possession guard still passes
        // for an owned resource.
        let session = session(Some("admin"), 1, org);
        let guard = Guard::new("app", Action::Read, Possession::Own);

        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::App(app)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_own_grant_does_not_satisfy_any_possession() {
        let org = Uuid::new_v4();
        let engine = engine(HashMap::new());
        let session = session(Some("developer"), 2, org);
        let guard = Guard::new("app", Action::Read, Possession::Any);

        assert!(engine.authorize(&session, &guard, None).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_override_bypasses_ownership() {
        let app = Uuid::new_v4();
        // App owned by an org the admin is NOT a member of.
        let engine = engine(HashMap::from([(app, Uuid::new_v4())]));
        let session = session(Some("admin"), 1, Uuid::new_v4());
        let guard = Guard::new("app", Action::Update, Possession::Own).with_admin_override();

        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::App(app)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_admin_override_does_not_help_other_roles() {
        let app = Uuid::new_v4();
        let engine = engine(HashMap::from([(app, Uuid::new_v4())]));
        let session = session(Some("developer"), 2, Uuid::new_v4());
        let guard = Guard::new("app", Action::Update, Possession::Own).with_admin_override();

        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::App(app)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_profile_ownership_is_id_equality() {
        let mut roles_with_profile = roles();
        roles_with_profile[1].grants["profile"] = json!({"read:own": ["*"]});
        let table = GrantTable::from_roles(&roles_with_profile).unwrap();
        let engine =
            AccessControlEngine::new(Arc::new(table), Arc::new(StaticStore(HashMap::new())));
        let session = session(Some("developer"), 2, Uuid::new_v4());
        let guard = Guard::new("profile", Action::Read, Possession::Own);

        let own_id = session.identity.identity_id;
        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::Profile(own_id)))
            .await
            .is_ok());
        assert!(engine
            .authorize(&session, &guard, Some(OwnershipRef::Profile(Uuid::new_v4())))
            .await
            .is_err());
    }

    #[test]
    fn test_allowed_fields_prefers_exact_possession() {
        let table = GrantTable::from_roles(&roles()).unwrap();
        let fields = table
            .allowed_fields("developer", "app", Action::Update, Possession::Own)
            .unwrap();
        assert_eq!(fields, ["name"]);
    }
}
