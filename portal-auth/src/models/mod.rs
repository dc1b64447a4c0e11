pub mod api_token;
pub mod identity;
pub mod idp_config;
pub mod invite;
pub mod organization;
pub mod refresh_token;
pub mod role;
pub mod sso_client;

pub use api_token::ApiToken;
pub use identity::{Identity, PublicProfile};
pub use idp_config::IdpConfiguration;
pub use invite::Invite;
pub use organization::{MembershipInfo, Organization, OrganizationMembership};
pub use refresh_token::RefreshToken;
pub use role::{Action, Possession, Role};
pub use sso_client::SsoClient;
