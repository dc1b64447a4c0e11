//! Organization and membership models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Organization entity. Business CRUD lives elsewhere; this service only
/// needs the row for membership and ownership checks.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Organization {
    pub org_id: Uuid,
    pub org_name: String,
    pub created_utc: DateTime<Utc>,
}

/// Membership entity linking an identity, an organization, and a role.
///
/// Exactly one membership per identity is flagged current; it selects the
/// active role for authorization.
#[derive(Debug, Clone, FromRow)]
pub struct OrganizationMembership {
    pub membership_id: Uuid,
    pub identity_id: Uuid,
    pub org_id: Uuid,
    pub role_name: String,
    pub is_current: bool,
    pub created_utc: DateTime<Utc>,
}

impl OrganizationMembership {
    pub fn new(identity_id: Uuid, org_id: Uuid, role_name: String, is_current: bool) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            identity_id,
            org_id,
            role_name,
            is_current,
            created_utc: Utc::now(),
        }
    }
}

/// Membership row joined with its organization and role, as resolved into
/// the request session.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MembershipInfo {
    pub org_id: Uuid,
    pub org_name: String,
    pub role_name: String,
    pub role_level: i64,
    pub is_current: bool,
}
