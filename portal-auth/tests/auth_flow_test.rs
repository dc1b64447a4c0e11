//! End-to-end flow tests over HTTP and a real database.
//!
//! These exercise the externally observable properties of the auth core:
//! uniform login failures, cookie issuance, refresh rotation, API-token
//! round trips, and the require-authenticated gate.

mod common;

use common::{cookie_value, TestApp};
use portal_auth::models::{Identity, Organization, OrganizationMembership};
use portal_auth::utils::{hash_password, Password};
use serde_json::{json, Value};
use uuid::Uuid;

async fn seed_identity(app: &TestApp, email: &str, password: &str) -> Identity {
    let hash = hash_password(&Password::new(password.to_string())).expect("hash");
    let identity = Identity::new_local(email.to_string(), hash.into_string(), None);
    app.state
        .db
        .insert_identity(&identity)
        .await
        .expect("insert identity");
    identity
}

async fn seed_org_with_member(app: &TestApp, identity: &Identity, role: &str) -> Organization {
    let org = Organization {
        org_id: Uuid::new_v4(),
        org_name: "Acme".to_string(),
        created_utc: chrono::Utc::now(),
    };
    app.state.db.insert_organization(&org).await.expect("org");
    app.state
        .db
        .insert_membership(&OrganizationMembership::new(
            identity.identity_id,
            org.org_id,
            role.to_string(),
            true,
        ))
        .await
        .expect("membership");
    org
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn login_failures_are_indistinguishable() {
    let app = TestApp::spawn().await;
    seed_identity(&app, "alice@example.com", "correct-horse-battery").await;

    let client = reqwest::Client::new();

    let wrong_password = client
        .post(app.url("/auth/login"))
        .json(&json!({"email": "alice@example.com", "password": "wrong"}))
        .send()
        .await
        .unwrap();
    let unknown_email = client
        .post(app.url("/auth/login"))
        .json(&json!({"email": "nobody@example.com", "password": "wrong"}))
        .send()
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), 401);
    assert_eq!(unknown_email.status(), 401);

    let body_a: Value = wrong_password.json().await.unwrap();
    let body_b: Value = unknown_email.json().await.unwrap();
    assert_eq!(body_a, body_b, "failure bodies must not differ");
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn login_sets_cookies_and_never_leaks_the_hash() {
    let app = TestApp::spawn().await;
    seed_identity(&app, "alice@example.com", "correct-horse-battery").await;

    let response = reqwest::Client::new()
        .post(app.url("/auth/login"))
        .json(&json!({"email": "alice@example.com", "password": "correct-horse-battery"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let access = cookie_value(&response, "access_token").expect("access cookie");
    let refresh = cookie_value(&response, "refresh_token").expect("refresh cookie");
    assert!(!access.is_empty());
    assert!(!refresh.is_empty());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn refresh_rotation_is_single_use() {
    let app = TestApp::spawn().await;
    let identity = seed_identity(&app, "alice@example.com", "correct-horse-battery").await;

    let client = reqwest::Client::new();
    let login = client
        .post(app.url("/auth/login"))
        .json(&json!({"email": "alice@example.com", "password": "correct-horse-battery"}))
        .send()
        .await
        .unwrap();
    let old_refresh = cookie_value(&login, "refresh_token").unwrap();

    // First use succeeds and hands out a different token.
    let rotated = client
        .post(app.url("/auth/refresh"))
        .header("Cookie", format!("refresh_token={}", old_refresh))
        .send()
        .await
        .unwrap();
    assert_eq!(rotated.status(), 200);
    let new_refresh = cookie_value(&rotated, "refresh_token").unwrap();
    assert_ne!(old_refresh, new_refresh);

    // Replaying the consumed token is unauthenticated.
    let replay = client
        .post(app.url("/auth/refresh"))
        .header("Cookie", format!("refresh_token={}", old_refresh))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);

    // Exactly one live token remains for this session.
    let count = app
        .state
        .db
        .count_refresh_tokens(identity.identity_id)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn api_token_round_trip_and_revocation() {
    let app = TestApp::spawn().await;
    let identity = seed_identity(&app, "alice@example.com", "correct-horse-battery").await;
    seed_org_with_member(&app, &identity, "developer").await;

    let client = reqwest::Client::new();
    let login = client
        .post(app.url("/auth/login"))
        .json(&json!({"email": "alice@example.com", "password": "correct-horse-battery"}))
        .send()
        .await
        .unwrap();
    let access = cookie_value(&login, "access_token").unwrap();

    let created = client
        .post(app.url("/auth/tokens"))
        .header("Cookie", format!("access_token={}", access))
        .json(&json!({"label": "ci"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    let bearer = created["token"].as_str().unwrap().to_string();
    let token_id = created["token_id"].as_i64().unwrap();
    assert!(bearer.starts_with(&format!("{}_", token_id)));

    // The bearer value authenticates.
    let introspect = client
        .get(app.url("/auth/introspect"))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(introspect.status(), 200);
    let session: Value = introspect.json().await.unwrap();
    assert_eq!(session["identity"]["email"], "alice@example.com");

    // Any mutated secret fails.
    let mutated = format!("{}x", bearer);
    let bad = client
        .get(app.url("/auth/introspect"))
        .bearer_auth(&mutated)
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 401);

    // Revocation kills the token.
    let revoked = client
        .delete(app.url(&format!("/auth/tokens/{}", token_id)))
        .header("Cookie", format!("access_token={}", access))
        .send()
        .await
        .unwrap();
    assert_eq!(revoked.status(), 200);

    let after = client
        .get(app.url("/auth/introspect"))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), 401);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn password_change_revokes_all_refresh_tokens() {
    let app = TestApp::spawn().await;
    let identity = seed_identity(&app, "alice@example.com", "correct-horse-battery").await;

    let client = reqwest::Client::new();
    // Two sessions (multi-device).
    let login_a = client
        .post(app.url("/auth/login"))
        .json(&json!({"email": "alice@example.com", "password": "correct-horse-battery"}))
        .send()
        .await
        .unwrap();
    let _login_b = client
        .post(app.url("/auth/login"))
        .json(&json!({"email": "alice@example.com", "password": "correct-horse-battery"}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        app.state
            .db
            .count_refresh_tokens(identity.identity_id)
            .await
            .unwrap(),
        2
    );

    let access = cookie_value(&login_a, "access_token").unwrap();
    let changed = client
        .post(app.url("/users/me/password"))
        .header("Cookie", format!("access_token={}", access))
        .json(&json!({
            "current_password": "correct-horse-battery",
            "new_password": "even-more-correct-horse"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(changed.status(), 200);

    assert_eq!(
        app.state
            .db
            .count_refresh_tokens(identity.identity_id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn org_switch_flips_the_active_role() {
    let app = TestApp::spawn().await;
    let identity = seed_identity(&app, "alice@example.com", "correct-horse-battery").await;
    let _org_a = seed_org_with_member(&app, &identity, "developer").await;

    // Second, non-current membership with a different role.
    let org_b = Organization {
        org_id: Uuid::new_v4(),
        org_name: "Globex".to_string(),
        created_utc: chrono::Utc::now(),
    };
    app.state.db.insert_organization(&org_b).await.unwrap();
    app.state
        .db
        .insert_membership(&OrganizationMembership::new(
            identity.identity_id,
            org_b.org_id,
            "member".to_string(),
            false,
        ))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let login = client
        .post(app.url("/auth/login"))
        .json(&json!({"email": "alice@example.com", "password": "correct-horse-battery"}))
        .send()
        .await
        .unwrap();
    let access = cookie_value(&login, "access_token").unwrap();

    let switched = client
        .post(app.url(&format!("/orgs/{}/switch", org_b.org_id)))
        .header("Cookie", format!("access_token={}", access))
        .send()
        .await
        .unwrap();
    assert_eq!(switched.status(), 200);

    let introspect = client
        .get(app.url("/auth/introspect"))
        .header("Cookie", format!("access_token={}", access))
        .send()
        .await
        .unwrap();
    let session: Value = introspect.json().await.unwrap();
    assert_eq!(session["active_role"]["name"], "member");
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn unauthenticated_requests_are_rejected_at_the_gate() {
    let app = TestApp::spawn().await;

    let response = reqwest::Client::new()
        .get(app.url("/auth/introspect"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}
