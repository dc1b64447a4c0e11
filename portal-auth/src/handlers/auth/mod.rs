pub mod federation;
pub mod session;

pub use federation::{authorize_redirect, token_exchange};
pub use session::{introspect, login, logout, refresh};

use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::{AuthConfig, SameSiteMode};
use crate::middleware::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::services::TokenSet;

/// The refresh cookie only travels to the auth routes.
pub(crate) const REFRESH_COOKIE_PATH: &str = "/auth";

fn same_site(mode: SameSiteMode) -> SameSite {
    match mode {
        SameSiteMode::Strict => SameSite::Strict,
        SameSiteMode::Lax => SameSite::Lax,
        SameSiteMode::None => SameSite::None,
    }
}

fn build_cookie(
    config: &AuthConfig,
    name: &'static str,
    value: String,
    path: &'static str,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .domain(config.cookies.domain.clone())
        .path(path)
        .http_only(true)
        .secure(config.cookies.secure)
        .same_site(same_site(config.cookies.same_site))
        .build()
}

/// The cookie pair set on password login, federation login, and refresh.
pub(crate) fn auth_cookies(
    config: &AuthConfig,
    set: &TokenSet,
) -> (Cookie<'static>, Cookie<'static>) {
    let mut access = build_cookie(config, ACCESS_TOKEN_COOKIE, set.access_token.clone(), "/");
    access.set_max_age(time::Duration::seconds(config.jwt.access_ttl_secs));

    let mut refresh = build_cookie(
        config,
        REFRESH_TOKEN_COOKIE,
        set.refresh.token.clone(),
        REFRESH_COOKIE_PATH,
    );
    refresh.set_max_age(time::Duration::seconds(config.jwt.refresh_ttl_secs));

    (access, refresh)
}

/// Both cookies emptied with an expiry in the past (logout/invalidation).
pub(crate) fn expired_cookies(config: &AuthConfig) -> (Cookie<'static>, Cookie<'static>) {
    let mut access = build_cookie(config, ACCESS_TOKEN_COOKIE, String::new(), "/");
    access.set_expires(time::OffsetDateTime::UNIX_EPOCH);

    let mut refresh = build_cookie(
        config,
        REFRESH_TOKEN_COOKIE,
        String::new(),
        REFRESH_COOKIE_PATH,
    );
    refresh.set_expires(time::OffsetDateTime::UNIX_EPOCH);

    (access, refresh)
}
