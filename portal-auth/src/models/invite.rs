//! Invite model - pending organization invitations.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Invitation entity. `identity_id` stays NULL until the invited email
/// resolves to an identity (federation login attaches it).
#[derive(Debug, Clone, FromRow)]
pub struct Invite {
    pub invite_id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub role_name: String,
    pub identity_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl Invite {
    pub fn new(org_id: Uuid, email: String, role_name: String) -> Self {
        Self {
            invite_id: Uuid::new_v4(),
            org_id,
            email,
            role_name,
            identity_id: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.identity_id.is_none()
    }
}
