//! Identity model - portal user accounts, password-based or federated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Identity entity.
///
/// An identity holds either a password hash or a federation reference,
/// or is still pending activation (invited but not yet confirmed).
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub federation_provider: Option<String>,
    pub federation_subject: Option<String>,
    pub pending_activation: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Identity {
    /// Create a new password-based identity.
    pub fn new_local(email: String, password_hash: String, display_name: Option<String>) -> Self {
        Self {
            identity_id: Uuid::new_v4(),
            email,
            display_name,
            password_hash: Some(password_hash),
            federation_provider: None,
            federation_subject: None,
            pending_activation: false,
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Create a new federated-only identity (no password).
    pub fn new_federated(
        provider: String,
        subject: String,
        email: String,
        display_name: Option<String>,
    ) -> Self {
        Self {
            identity_id: Uuid::new_v4(),
            email,
            display_name,
            password_hash: None,
            federation_provider: Some(provider),
            federation_subject: Some(subject),
            pending_activation: false,
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn is_federated(&self) -> bool {
        self.federation_provider.is_some() && self.federation_subject.is_some()
    }

    /// Credential-shape invariant: password hash XOR federation reference,
    /// or still pending activation.
    pub fn credential_shape_is_valid(&self) -> bool {
        self.pending_activation || (self.has_password() != self.is_federated())
    }

    /// A pending identity never authenticates with a password.
    pub fn can_password_authenticate(&self) -> bool {
        !self.pending_activation && self.has_password()
    }

    /// The outward-facing projection. This type simply has no secret field,
    /// so a password hash can never leak through serialization.
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile::from(self.clone())
    }
}

/// Public profile projection of an identity (no secret fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub identity_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub federated: bool,
    pub pending_activation: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl From<Identity> for PublicProfile {
    fn from(i: Identity) -> Self {
        let federated = i.is_federated();
        Self {
            identity_id: i.identity_id,
            email: i.email,
            display_name: i.display_name,
            federated,
            pending_activation: i.pending_activation,
            last_login_utc: i.last_login_utc,
            created_utc: i.created_utc,
        }
    }
}

/// Request to login with email/password.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Request to change the caller's password.
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 256))]
    pub current_password: String,
    #[validate(length(min = 12, max = 256))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_identity_shape() {
        let id = Identity::new_local("a@b.com".into(), "$argon2...".into(), None);
        assert!(id.credential_shape_is_valid());
        assert!(id.can_password_authenticate());
        assert!(!id.is_federated());
    }

    #[test]
    fn test_federated_identity_shape() {
        let id = Identity::new_federated("google".into(), "sub-1".into(), "a@b.com".into(), None);
        assert!(id.credential_shape_is_valid());
        assert!(!id.can_password_authenticate());
        assert!(id.is_federated());
    }

    #[test]
    fn test_pending_identity_cannot_password_authenticate() {
        let mut id = Identity::new_local("a@b.com".into(), "$argon2...".into(), None);
        id.pending_activation = true;
        assert!(id.credential_shape_is_valid());
        assert!(!id.can_password_authenticate());
    }

    #[test]
    fn test_profile_has_no_secret() {
        let id = Identity::new_local("a@b.com".into(), "$argon2...".into(), None);
        let json = serde_json::to_value(id.public_profile()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@b.com");
    }
}
