pub mod access_control;
pub mod auth;
pub mod database;
pub mod error;
pub mod oidc;
pub mod token;

pub use access_control::{AccessControlEngine, GrantTable, Guard, OwnershipRef, OwnershipStore};
pub use auth::AuthService;
pub use database::Database;
pub use error::AuthError;
pub use oidc::{DiscoveryDocument, IdTokenClaims, OidcClient};
pub use token::{AccessClaims, IssuedRefresh, TokenService, TokenSet};
