//! Session resolution middleware.
//!
//! Two credential sources are evaluated independently per request: an
//! access token carried in a cookie, and an API-token bearer header. A
//! present-but-invalid credential is rejected outright; a request carrying
//! neither simply resolves no session, and the `require_auth` gate decides
//! whether that is acceptable for the route.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use uuid::Uuid;

use crate::models::role::ADMIN_ROLE;
use crate::models::{MembershipInfo, PublicProfile};
use crate::services::{AuthError, Database};
use crate::AppState;
use portal_core::error::AppError;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// The role selected by the caller's current organization membership.
#[derive(Debug, Clone, Serialize)]
pub struct RoleInfo {
    pub name: String,
    pub level: i64,
}

/// The resolved caller: profile, memberships, and active role. Attached to
/// the request once and never re-derived downstream.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub identity: PublicProfile,
    pub organizations: Vec<MembershipInfo>,
    pub active_role: Option<RoleInfo>,
}

impl Session {
    /// Admin status is derived, never stored.
    pub fn is_admin(&self) -> bool {
        self.active_role
            .as_ref()
            .map(|r| r.name == ADMIN_ROLE)
            .unwrap_or(false)
    }

    pub fn active_org_id(&self) -> Option<Uuid> {
        self.organizations
            .iter()
            .find(|m| m.is_current)
            .map(|m| m.org_id)
    }
}

/// Load the full session for an identity: profile plus all memberships,
/// with the current one selecting the active role.
pub(crate) async fn resolve(db: &Database, identity_id: Uuid) -> Result<Session, AuthError> {
    let identity = db
        .find_identity_by_id(identity_id)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    let organizations = db.find_memberships(identity_id).await?;
    let active_role = organizations
        .iter()
        .find(|m| m.is_current)
        .map(|m| RoleInfo {
            name: m.role_name.clone(),
            level: m.role_level,
        });

    Ok(Session {
        identity: identity.public_profile(),
        organizations,
        active_role,
    })
}

/// Resolve the caller's session from cookie and/or bearer credentials.
pub async fn resolve_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut session: Option<Session> = None;

    // Cookie credential: a present cookie must carry a valid access token.
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        let claims = state
            .tokens
            .validate_access_token(cookie.value())
            .map_err(|_| {
                AppError::Unauthorized(anyhow::anyhow!("Session expired, please sign in again"))
            })?;

        let identity_id = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| AppError::from(AuthError::InvalidToken))?;

        session = Some(resolve(&state.db, identity_id).await?);
    }

    // Bearer credential: `Authorization: Bearer {id}_{secret}`.
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.to_string());

    if let Some(bearer) = bearer {
        let identity = state.auth.verify_api_token(&bearer).await?;
        if session.is_none() {
            session = Some(resolve(&state.db, identity.identity_id).await?);
        }
    }

    if let Some(session) = session {
        req.extensions_mut().insert(session);
    }

    Ok(next.run(req).await)
}

/// Gate: reject requests where neither credential resolved an identity.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, AppError> {
    if req.extensions().get::<Session>().is_none() {
        return Err(AuthError::Unauthenticated.into());
    }
    Ok(next.run(req).await)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Extractor to easily get the resolved session in handlers
pub struct CurrentSession(pub Session);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Session missing from request extensions".to_string(),
                }),
            )
                .into_response()
        })?;

        Ok(CurrentSession(session.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile() -> PublicProfile {
        PublicProfile {
            identity_id: Uuid::new_v4(),
            email: "dev@example.com".into(),
            display_name: None,
            federated: false,
            pending_activation: false,
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn test_admin_is_derived_from_active_role_name() {
        let session = Session {
            identity: profile(),
            organizations: vec![],
            active_role: Some(RoleInfo {
                name: "admin".into(),
                level: 1,
            }),
        };
        assert!(session.is_admin());

        let session = Session {
            active_role: Some(RoleInfo {
                name: "developer".into(),
                level: 2,
            }),
            ..session
        };
        assert!(!session.is_admin());
    }

    #[test]
    fn test_no_current_membership_means_no_active_org() {
        let session = Session {
            identity: profile(),
            organizations: vec![],
            active_role: None,
        };
        assert!(session.active_org_id().is_none());
        assert!(!session.is_admin());
    }
}
