//! Identity-provider configuration model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Persisted identity-provider configuration. At most one row is active;
/// it is read fresh on every federation request so the provider can be
/// switched at runtime without a restart.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdpConfiguration {
    pub provider: String,
    pub active: bool,
    pub discovery_url: String,
    pub registration_endpoint: Option<String>,
    pub bootstrap_id: Option<String>,
    pub bootstrap_secret: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Request to replace the active identity-provider configuration.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateIdpConfigRequest {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(url)]
    pub discovery_url: String,
    #[validate(url)]
    pub registration_endpoint: Option<String>,
    pub bootstrap_id: Option<String>,
    pub bootstrap_secret: Option<String>,
}

/// Configuration view returned to admins (no bootstrap secret).
#[derive(Debug, Serialize)]
pub struct IdpConfigResponse {
    pub provider: String,
    pub active: bool,
    pub discovery_url: String,
    pub registration_endpoint: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<IdpConfiguration> for IdpConfigResponse {
    fn from(c: IdpConfiguration) -> Self {
        Self {
            provider: c.provider,
            active: c.active,
            discovery_url: c.discovery_url,
            registration_endpoint: c.registration_endpoint,
            created_utc: c.created_utc,
        }
    }
}
