use portal_core::error::AppError;
use thiserror::Error;

/// Domain errors for the authentication and access-control core.
///
/// Credential-shaped failures deliberately collapse to generic messages at
/// the HTTP boundary so callers cannot enumerate accounts or probe which
/// check failed.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Federation code exchange failed")]
    FederationExchangeFailed,

    #[error("Federation token verification failed")]
    FederationVerificationFailed,

    #[error("Federated identity has no email claim")]
    MissingEmailClaim,

    #[error("Identity provider misconfigured: {0}")]
    ProviderMisconfigured(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthenticated")]
    Unauthenticated,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            AuthError::Internal(e) => AppError::InternalError(e),
            AuthError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            AuthError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            AuthError::FederationExchangeFailed
            | AuthError::FederationVerificationFailed
            | AuthError::MissingEmailClaim => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
            }
            AuthError::ProviderMisconfigured(detail) => {
                // Detail is logged server-side only; the caller sees a
                // generic 500.
                AppError::ConfigError(anyhow::anyhow!("identity provider misconfigured: {}", detail))
            }
            AuthError::Forbidden => AppError::Forbidden,
            AuthError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failures_collapse_to_one_message() {
        // Unknown email, wrong password, disabled account: all map to the
        // same generic body.
        let a = AppError::from(AuthError::InvalidCredentials);
        let b = AppError::from(AuthError::InvalidCredentials);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_federation_failures_share_a_generic_message() {
        let exchange = AppError::from(AuthError::FederationExchangeFailed);
        let verify = AppError::from(AuthError::FederationVerificationFailed);
        let email = AppError::from(AuthError::MissingEmailClaim);
        assert_eq!(exchange.to_string(), verify.to_string());
        assert_eq!(verify.to_string(), email.to_string());
    }
}
