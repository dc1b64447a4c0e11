//! Refresh token model - opaque, single-use, rotated on every refresh.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh token entity. The opaque token string is the primary key.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token: String,
    pub identity_id: Uuid,
    pub expires_utc: DateTime<Utc>,
}

impl RefreshToken {
    /// Bind an issued opaque token to its owning identity.
    pub fn new(token: String, identity_id: Uuid, ttl_secs: i64) -> Self {
        Self {
            token,
            identity_id,
            expires_utc: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_utc <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_is_not_expired() {
        let t = RefreshToken::new("abc".into(), Uuid::new_v4(), 60);
        assert!(!t.is_expired());
    }

    #[test]
    fn test_expiry_is_absolute_from_ttl() {
        let t = RefreshToken::new("abc".into(), Uuid::new_v4(), 3600);
        let delta = t.expires_utc - Utc::now();
        assert!(delta.num_seconds() > 3590 && delta.num_seconds() <= 3600);
    }
}
