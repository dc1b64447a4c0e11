//! PostgreSQL database service.
//!
//! Single accessor for all persisted state. The two multi-step-consistency
//! operations (refresh rotation, federated account linkage) run their reads
//! and writes inside one transaction; a transaction dropped on an early
//! error path rolls back.

use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    ApiToken, Identity, IdpConfiguration, Invite, MembershipInfo, Organization,
    OrganizationMembership, RefreshToken, Role, SsoClient,
};
use crate::services::error::AuthError;
use crate::services::token::IssuedRefresh;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AuthError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Identity Operations ====================

    /// Find identity by ID.
    pub async fn find_identity_by_id(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<Identity>, AuthError> {
        let row =
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// Find identity by email, case-insensitively.
    pub async fn find_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let row = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Find identity by federation reference.
    pub async fn find_identity_by_federation(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let row = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE federation_provider = $1 AND federation_subject = $2",
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert a new identity.
    pub async fn insert_identity(&self, identity: &Identity) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO identities
                (identity_id, email, display_name, password_hash,
                 federation_provider, federation_subject, pending_activation,
                 last_login_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(identity.identity_id)
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(&identity.password_hash)
        .bind(&identity.federation_provider)
        .bind(&identity.federation_subject)
        .bind(identity.pending_activation)
        .bind(identity.last_login_utc)
        .bind(identity.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stamp the last successful login.
    pub async fn touch_last_login(&self, identity_id: Uuid) -> Result<(), AuthError> {
        sqlx::query("UPDATE identities SET last_login_utc = NOW() WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace the password hash and revoke every refresh token the
    /// identity holds, atomically.
    pub async fn change_password(
        &self,
        identity_id: Uuid,
        new_hash: &str,
    ) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE identities SET password_hash = $1 WHERE identity_id = $2")
            .bind(new_hash)
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM refresh_tokens WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Refresh Token Operations ====================

    /// Insert a refresh token row.
    pub async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token, identity_id, expires_utc) VALUES ($1, $2, $3)",
        )
        .bind(&token.token)
        .bind(token.identity_id)
        .bind(token.expires_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete one refresh token (logout). Missing rows are not an error.
    pub async fn delete_refresh_token(&self, token: &str) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rotate a refresh token: consume the old row and persist its
    /// successor in one transaction.
    ///
    /// Returns the owning identity, or None when the old token does not
    /// exist (already used, expired, or never issued) - the caller treats
    /// that as a potential replay and answers unauthenticated. Two racing
    /// rotations of the same token: the DELETE succeeds for at most one of
    /// them. A failure after the DELETE rolls the whole transaction back,
    /// so the old token is never lost without its successor.
    pub async fn rotate_refresh_token(
        &self,
        old_token: &str,
        issued: &IssuedRefresh,
    ) -> Result<Option<Uuid>, AuthError> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<(Uuid,)> = sqlx::query_as(
            "DELETE FROM refresh_tokens WHERE token = $1 AND expires_utc > NOW() RETURNING identity_id",
        )
        .bind(old_token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((identity_id,)) = owner else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO refresh_tokens (token, identity_id, expires_utc) VALUES ($1, $2, $3)",
        )
        .bind(&issued.token)
        .bind(identity_id)
        .bind(issued.expires_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(identity_id))
    }

    /// Count live refresh tokens for an identity.
    pub async fn count_refresh_tokens(&self, identity_id: Uuid) -> Result<i64, AuthError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens WHERE identity_id = $1 AND expires_utc > NOW()",
        )
        .bind(identity_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ==================== API Token Operations ====================

    /// Insert an API token; the id is assigned by the database.
    pub async fn insert_api_token(
        &self,
        identity_id: Uuid,
        label: &str,
        secret_hash: &str,
    ) -> Result<ApiToken, AuthError> {
        let token = sqlx::query_as::<_, ApiToken>(
            r#"
            INSERT INTO api_tokens (identity_id, token_label, secret_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(identity_id)
        .bind(label)
        .bind(secret_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(token)
    }

    /// Find an API token by its numeric id.
    pub async fn find_api_token(&self, token_id: i64) -> Result<Option<ApiToken>, AuthError> {
        let row = sqlx::query_as::<_, ApiToken>("SELECT * FROM api_tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// List the API tokens owned by an identity.
    pub async fn list_api_tokens(&self, identity_id: Uuid) -> Result<Vec<ApiToken>, AuthError> {
        let rows = sqlx::query_as::<_, ApiToken>(
            "SELECT * FROM api_tokens WHERE identity_id = $1 ORDER BY token_id",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Revoke an API token. Scoped to the owning identity.
    pub async fn delete_api_token(
        &self,
        token_id: i64,
        identity_id: Uuid,
    ) -> Result<bool, AuthError> {
        let result =
            sqlx::query("DELETE FROM api_tokens WHERE token_id = $1 AND identity_id = $2")
                .bind(token_id)
                .bind(identity_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Role Operations ====================

    /// Find role by name.
    pub async fn find_role_by_name(&self, role_name: &str) -> Result<Option<Role>, AuthError> {
        let row = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE role_name = $1")
            .bind(role_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// All roles (grant-table load).
    pub async fn find_all_roles(&self) -> Result<Vec<Role>, AuthError> {
        let rows = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY role_level")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Roles an assigner at `level` may grant (levels >= its own).
    pub async fn find_roles_assignable_by(&self, level: i64) -> Result<Vec<Role>, AuthError> {
        let rows = sqlx::query_as::<_, Role>(
            "SELECT * FROM roles WHERE role_level >= $1 ORDER BY role_level",
        )
        .bind(level)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ==================== Organization / Membership Operations ====================

    /// Insert an organization.
    pub async fn insert_organization(&self, org: &Organization) -> Result<(), AuthError> {
        sqlx::query("INSERT INTO organizations (org_id, org_name, created_utc) VALUES ($1, $2, $3)")
            .bind(org.org_id)
            .bind(&org.org_name)
            .bind(org.created_utc)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a membership row.
    pub async fn insert_membership(
        &self,
        membership: &OrganizationMembership,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO organization_memberships
                (membership_id, identity_id, org_id, role_name, is_current, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.identity_id)
        .bind(membership.org_id)
        .bind(&membership.role_name)
        .bind(membership.is_current)
        .bind(membership.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All memberships for an identity, joined with organization and role.
    pub async fn find_memberships(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<MembershipInfo>, AuthError> {
        let rows = sqlx::query_as::<_, MembershipInfo>(
            r#"
            SELECT o.org_id, o.org_name, r.role_name, r.role_level, m.is_current
            FROM organization_memberships m
            JOIN organizations o ON o.org_id = m.org_id
            JOIN roles r ON r.role_name = m.role_name
            WHERE m.identity_id = $1
            ORDER BY o.org_name
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Move the current flag to the membership in `org_id`, atomically.
    /// Returns false when the identity has no membership there.
    pub async fn switch_current_membership(
        &self,
        identity_id: Uuid,
        org_id: Uuid,
    ) -> Result<bool, AuthError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE organization_memberships SET is_current = FALSE WHERE identity_id = $1 AND is_current",
        )
        .bind(identity_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE organization_memberships SET is_current = TRUE WHERE identity_id = $1 AND org_id = $2",
        )
        .bind(identity_id)
        .bind(org_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // No membership to switch to; roll the flag clear back.
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Is the identity a member of the organization?
    pub async fn is_org_member(&self, identity_id: Uuid, org_id: Uuid) -> Result<bool, AuthError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM organization_memberships WHERE identity_id = $1 AND org_id = $2)",
        )
        .bind(identity_id)
        .bind(org_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    // ==================== App Operations ====================

    /// Insert an app row (ownership fixture; app CRUD is external).
    pub async fn insert_app(&self, app_id: Uuid, org_id: Uuid, name: &str) -> Result<(), AuthError> {
        sqlx::query("INSERT INTO apps (app_id, org_id, app_name) VALUES ($1, $2, $3)")
            .bind(app_id)
            .bind(org_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The organization owning an app.
    pub async fn find_app_owner_org(&self, app_id: Uuid) -> Result<Option<Uuid>, AuthError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT org_id FROM apps WHERE app_id = $1")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(org_id,)| org_id))
    }

    // ==================== Invite Operations ====================

    /// Insert an invite.
    pub async fn insert_invite(&self, invite: &Invite) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO invites (invite_id, org_id, email, role_name, identity_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(invite.invite_id)
        .bind(invite.org_id)
        .bind(&invite.email)
        .bind(&invite.role_name)
        .bind(invite.identity_id)
        .bind(invite.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Pending invites addressed to an email (no identity attached yet).
    pub async fn find_pending_invites_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<Invite>, AuthError> {
        let rows = sqlx::query_as::<_, Invite>(
            "SELECT * FROM invites WHERE LOWER(email) = LOWER($1) AND identity_id IS NULL",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ==================== Federation Linkage ====================

    /// Resolve a verified federated login into an identity, in ONE
    /// transaction: find-or-create the identity, refresh its profile from
    /// the latest claims, attach pending invites addressed to the email,
    /// and persist the issued refresh token. Any failure rolls back all of
    /// it.
    pub async fn link_federated_login(
        &self,
        provider: &str,
        subject: &str,
        email: &str,
        display_name: Option<&str>,
        issued: &IssuedRefresh,
    ) -> Result<Identity, AuthError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE federation_provider = $1 AND federation_subject = $2",
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&mut *tx)
        .await?;

        let identity = match existing {
            Some(found) => {
                // Always refresh name/email from the latest claims.
                sqlx::query_as::<_, Identity>(
                    r#"
                    UPDATE identities
                    SET email = $1,
                        display_name = COALESCE($2, display_name),
                        last_login_utc = NOW()
                    WHERE identity_id = $3
                    RETURNING *
                    "#,
                )
                .bind(email)
                .bind(display_name)
                .bind(found.identity_id)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                let mut identity = Identity::new_federated(
                    provider.to_string(),
                    subject.to_string(),
                    email.to_string(),
                    display_name.map(|s| s.to_string()),
                );
                identity.last_login_utc = Some(chrono::Utc::now());

                sqlx::query(
                    r#"
                    INSERT INTO identities
                        (identity_id, email, display_name, password_hash,
                         federation_provider, federation_subject, pending_activation,
                         last_login_utc, created_utc)
                    VALUES ($1, $2, $3, NULL, $4, $5, FALSE, $6, $7)
                    "#,
                )
                .bind(identity.identity_id)
                .bind(&identity.email)
                .bind(&identity.display_name)
                .bind(&identity.federation_provider)
                .bind(&identity.federation_subject)
                .bind(identity.last_login_utc)
                .bind(identity.created_utc)
                .execute(&mut *tx)
                .await?;

                identity
            }
        };

        // Attach every pending invite addressed to this email and
        // materialize its membership.
        let attached: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            UPDATE invites
            SET identity_id = $1
            WHERE LOWER(email) = LOWER($2) AND identity_id IS NULL
            RETURNING org_id, role_name
            "#,
        )
        .bind(identity.identity_id)
        .bind(email)
        .fetch_all(&mut *tx)
        .await?;

        for (org_id, role_name) in attached {
            let (has_current,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(SELECT 1 FROM organization_memberships WHERE identity_id = $1 AND is_current)",
            )
            .bind(identity.identity_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO organization_memberships
                    (membership_id, identity_id, org_id, role_name, is_current)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (identity_id, org_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(identity.identity_id)
            .bind(org_id)
            .bind(&role_name)
            .bind(!has_current)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO refresh_tokens (token, identity_id, expires_utc) VALUES ($1, $2, $3)",
        )
        .bind(&issued.token)
        .bind(identity.identity_id)
        .bind(issued.expires_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(identity)
    }

    // ==================== SSO Client Operations ====================

    /// Find the client registration for a provider.
    pub async fn find_sso_client(&self, provider: &str) -> Result<Option<SsoClient>, AuthError> {
        let row = sqlx::query_as::<_, SsoClient>("SELECT * FROM sso_clients WHERE provider = $1")
            .bind(provider)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Persist a client registration.
    pub async fn insert_sso_client(&self, client: &SsoClient) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO sso_clients (provider, client_id, client_secret, extra, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&client.provider)
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(&client.extra)
        .bind(client.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop a client registration row.
    pub async fn delete_sso_client(&self, provider: &str) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM sso_clients WHERE provider = $1")
            .bind(provider)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== IdP Configuration Operations ====================

    /// The active identity-provider configuration, read fresh per request.
    pub async fn find_active_idp_config(&self) -> Result<Option<IdpConfiguration>, AuthError> {
        let row = sqlx::query_as::<_, IdpConfiguration>(
            "SELECT * FROM idp_configurations WHERE active",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Replace the active configuration: deactivate the old row and upsert
    /// the new one as active, atomically.
    pub async fn upsert_active_idp_config(
        &self,
        config: &IdpConfiguration,
    ) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE idp_configurations SET active = FALSE WHERE active")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO idp_configurations
                (provider, active, discovery_url, registration_endpoint,
                 bootstrap_id, bootstrap_secret, created_utc)
            VALUES ($1, TRUE, $2, $3, $4, $5, $6)
            ON CONFLICT (provider) DO UPDATE SET
                active = TRUE,
                discovery_url = EXCLUDED.discovery_url,
                registration_endpoint = EXCLUDED.registration_endpoint,
                bootstrap_id = EXCLUDED.bootstrap_id,
                bootstrap_secret = EXCLUDED.bootstrap_secret
            "#,
        )
        .bind(&config.provider)
        .bind(&config.discovery_url)
        .bind(&config.registration_endpoint)
        .bind(&config.bootstrap_id)
        .bind(&config.bootstrap_secret)
        .bind(config.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
