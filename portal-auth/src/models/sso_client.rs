//! SSO client model - per-provider OAuth2 client registration.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// OAuth2 client registration held against an identity provider. Created
/// lazily the first time federation is exercised for that provider.
#[derive(Debug, Clone, FromRow)]
pub struct SsoClient {
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub extra: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}
