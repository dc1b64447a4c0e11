pub mod auth;

pub use auth::{
    require_auth, resolve_session, CurrentSession, RoleInfo, Session, ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
};
