use portal_core::config as core_config;
use portal_core::error::AppError;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub cookies: CookieConfig,
    pub oidc: OidcConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub issuer: String,
    /// Access-token lifetime, seconds.
    pub access_ttl_secs: i64,
    /// Refresh-token lifetime, seconds.
    pub refresh_ttl_secs: i64,
    /// Entropy of opaque refresh tokens, bytes.
    pub refresh_token_bytes: usize,
    /// Entropy of API-token secrets, bytes.
    pub api_secret_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub domain: String,
    pub secure: bool,
    pub same_site: SameSiteMode,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SameSiteMode {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// Redirect URI sent on a normal sign-in.
    pub redirect_uri: String,
    /// Redirect URI sent on an invite sign-in.
    pub invite_redirect_uri: String,
    /// Upper bound on any outbound call to an identity provider, seconds.
    pub outbound_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("portal-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("portal-auth"), is_prod)?,
                access_ttl_secs: parse_env("JWT_ACCESS_TTL_SECS", "900", is_prod)?,
                refresh_ttl_secs: parse_env("JWT_REFRESH_TTL_SECS", "604800", is_prod)?,
                refresh_token_bytes: parse_env("REFRESH_TOKEN_BYTES", "32", is_prod)?,
                api_secret_bytes: parse_env("API_SECRET_BYTES", "32", is_prod)?,
            },
            cookies: CookieConfig {
                domain: get_env("COOKIE_DOMAIN", Some("localhost"), is_prod)?,
                secure: parse_env("COOKIE_SECURE", "true", is_prod)?,
                same_site: get_env("COOKIE_SAME_SITE", Some("lax"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            oidc: OidcConfig {
                redirect_uri: get_env(
                    "OIDC_REDIRECT_URI",
                    Some("http://localhost:3000/auth/callback"),
                    is_prod,
                )?,
                invite_redirect_uri: get_env(
                    "OIDC_INVITE_REDIRECT_URI",
                    Some("http://localhost:3000/invite/callback"),
                    is_prod,
                )?,
                outbound_timeout_secs: parse_env("OIDC_OUTBOUND_TIMEOUT_SECS", "10", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_ttl_secs <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TTL_SECS must be positive"
            )));
        }

        if self.jwt.refresh_ttl_secs <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TTL_SECS must be positive"
            )));
        }

        if self.jwt.refresh_token_bytes < 16 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_BYTES must be at least 16"
            )));
        }

        if self.environment == Environment::Prod {
            if !self.cookies.secure {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "COOKIE_SECURE must be enabled in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SameSiteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(SameSiteMode::Strict),
            "lax" => Ok(SameSiteMode::Lax),
            "none" => Ok(SameSiteMode::None),
            _ => Err(format!("Invalid SameSite mode: {}", s)),
        }
    }
}
