//! API token model - long-lived opaque machine credentials.
//!
//! The bearer value presented on the wire is `"{id}_{secret}"`. Only a
//! salted hash of the secret is ever persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// API token entity.
#[derive(Debug, Clone, FromRow)]
pub struct ApiToken {
    pub token_id: i64,
    pub identity_id: Uuid,
    pub token_label: String,
    pub secret_hash: String,
    pub created_utc: DateTime<Utc>,
}

impl ApiToken {
    /// Compose the wire format handed to the caller exactly once.
    pub fn bearer_value(token_id: i64, secret: &str) -> String {
        format!("{}_{}", token_id, secret)
    }

    /// Split a presented bearer value on the FIRST underscore.
    ///
    /// Secrets are plain hex, so the id prefix can never be forged by a
    /// crafted secret.
    pub fn parse_bearer(value: &str) -> Option<(i64, &str)> {
        let (id, secret) = value.split_once('_')?;
        if secret.is_empty() {
            return None;
        }
        let id = id.parse::<i64>().ok()?;
        Some((id, secret))
    }
}

/// Request to create an API token.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiTokenRequest {
    #[validate(length(min = 1, max = 128))]
    pub label: String,
}

/// API token metadata for listings (never includes the secret).
#[derive(Debug, Serialize)]
pub struct ApiTokenResponse {
    pub token_id: i64,
    pub token_label: String,
    pub created_utc: DateTime<Utc>,
}

impl From<ApiToken> for ApiTokenResponse {
    fn from(t: ApiToken) -> Self {
        Self {
            token_id: t.token_id,
            token_label: t.token_label,
            created_utc: t.created_utc,
        }
    }
}

/// Response returned on creation, the only time the secret is visible.
#[derive(Debug, Serialize)]
pub struct CreatedApiTokenResponse {
    pub token_id: i64,
    pub token_label: String,
    /// `"{id}_{secret}"` - store it now, it cannot be retrieved again.
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_round_trip() {
        let value = ApiToken::bearer_value(42, "deadbeef");
        assert_eq!(value, "42_deadbeef");
        assert_eq!(ApiToken::parse_bearer(&value), Some((42, "deadbeef")));
    }

    #[test]
    fn test_parse_splits_on_first_underscore_only() {
        // A mutated secret containing underscores still resolves to id 7.
        assert_eq!(ApiToken::parse_bearer("7_ab_cd"), Some((7, "ab_cd")));
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        assert_eq!(ApiToken::parse_bearer("no-underscore"), None);
        assert_eq!(ApiToken::parse_bearer("_secret"), None);
        assert_eq!(ApiToken::parse_bearer("12_"), None);
        assert_eq!(ApiToken::parse_bearer("abc_secret"), None);
    }
}
