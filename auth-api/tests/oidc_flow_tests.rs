/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 */

//! Browser login through the router against a mock identity provider.

mod test_helpers;

use auth_api::audit::AuditAction;
use auth_types::responses::ProfileResponse;
use auth_types::{APIError, APIResponse};
use axum::http::StatusCode;
use serde_json::json;
use test_helpers::*;

#[tokio::test]
async fn login_redirects_to_provider_with_pkce() {
    let t = spawn_app().await;
    let resp = t.send(get("/auth/mock/login?returnTo=/wiki")).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let url = location(&resp);
    assert!(url.starts_with(&format!("{}/authorize?", t.issuer())));
    let params = query_params(&url);
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["redirect_uri"], "http://app.test/auth/callback");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["scope"], "openid email profile");
    assert_ne!(params["state"], params["nonce"]);
    assert_eq!(t.store.session_count().await, 1);
}

#[tokio::test]
async fn unknown_provider_is_a_generic_failure() {
    let t = spawn_app().await;
    let resp = t.send(get("/auth/github/login")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: APIResponse<APIError> = response_json(resp).await;
    assert_eq!(body.result.code, "AUTHENTICATION_FAILED");
    assert_eq!(t.store.session_count().await, 0);
}

#[tokio::test]
async fn full_login_sets_cookie_and_profile_works() {
    let t = spawn_app().await;
    let resp = complete_login(&t, json!({})).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), AFTER_LOGIN_URL);

    let set_cookie = resp
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(!set_cookie.contains("Secure"));

    let cookie = session_cookie(&resp).expect("session cookie");
    assert!(cookie.starts_with("ak_"));

    let resp = t
        .send(
            with_cookie("GET", "/api/v1/profile", &cookie)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: APIResponse<ProfileResponse> = response_json(resp).await;
    assert_eq!(body.result.email, "alice@example.com");
    assert_eq!(body.result.display_name, "Alice Example");
    assert_eq!(body.result.role, "user");
    assert_eq!(body.result.identities.len(), 1);
    assert_eq!(body.result.identities[0].provider, "mock");
}

#[tokio::test]
async fn return_to_is_honoured() {
    let t = spawn_app().await;
    let (state, nonce) = start_login(&t, Some("/wiki/page")).await;
    mount_token_response(&t.idp, &id_token_claims(&t.issuer(), &nonce)).await;
    let resp = t
        .send(get(&format!("/auth/callback?state={state}&code=c")))
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/wiki/page");
}

#[tokio::test]
async fn replayed_and_unknown_state_look_identical() {
    let t = spawn_app().await;
    let (state, nonce) = start_login(&t, None).await;
    mount_token_response(&t.idp, &id_token_claims(&t.issuer(), &nonce)).await;
    let first = t
        .send(get(&format!("/auth/callback?state={state}&code=c")))
        .await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);

    let replay = t
        .send(get(&format!("/auth/callback?state={state}&code=c")))
        .await;
    let unknown = t.send(get("/auth/callback?state=never-issued&code=c")).await;

    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let a: APIResponse<APIError> = response_json(replay).await;
    let b: APIResponse<APIError> = response_json(unknown).await;
    assert_eq!(a.result, b.result);

    let reasons: Vec<_> = t
        .store
        .audit_entries()
        .await
        .into_iter()
        .filter(|e| e.action == AuditAction::OidcFailed)
        .filter_map(|e| e.metadata.get("reason").cloned())
        .collect();
    assert_eq!(reasons, vec!["replay", "invalid_state"]);
}

#[tokio::test]
async fn expired_session_reports_session_expired() {
    let t = spawn_app().await;
    let (state, nonce) = start_login(&t, None).await;
    mount_token_response(&t.idp, &id_token_claims(&t.issuer(), &nonce)).await;
    t.clock.advance(chrono::Duration::minutes(31));

    let resp = t
        .send(get(&format!("/auth/callback?state={state}&code=c")))
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: APIResponse<APIError> = response_json(resp).await;
    assert_eq!(body.result.code, "SESSION_EXPIRED");
}

#[tokio::test]
async fn wrong_nonce_is_rejected() {
    let t = spawn_app().await;
    let (state, _nonce) = start_login(&t, None).await;
    mount_token_response(&t.idp, &id_token_claims(&t.issuer(), "attacker-nonce")).await;

    let resp = t
        .send(get(&format!("/auth/callback?state={state}&code=c")))
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&resp).is_none());
    let body: APIResponse<APIError> = response_json(resp).await;
    assert_eq!(body.result.code, "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn token_for_another_client_is_rejected() {
    let t = spawn_app().await;
    let resp = complete_login(&t, json!({ "aud": "someone-else" })).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn allowlist_rejects_other_domains() {
    let t = spawn_app_with(&[("AUTH_ALLOWED_DOMAINS", "corp.example")]).await;
    let resp = complete_login(&t, json!({})).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = complete_login(&t, json!({ "email": "bob@corp.example" })).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn allowlisted_user_outside_domain_is_allowed() {
    let t = spawn_app_with(&[
        ("AUTH_ALLOWED_DOMAINS", "example.com"),
        ("AUTH_ALLOWED_USERS", "vip@other.com"),
    ])
    .await;
    let resp = complete_login(&t, json!({ "email": "vip@other.com" })).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let resp = complete_login(&t, json!({ "sub": "x-2", "email": "a@other.com" })).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_email_gets_admin_role() {
    let t = spawn_app_with(&[("AUTH_ADMIN_EMAILS", "alice@example.com")]).await;
    let resp = complete_login(&t, json!({})).await;
    let cookie = session_cookie(&resp).unwrap();
    let resp = t
        .send(
            with_cookie("GET", "/api/v1/profile", &cookie)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    let body: APIResponse<ProfileResponse> = response_json(resp).await;
    assert_eq!(body.result.role, "admin");
}

#[tokio::test]
async fn second_login_reuses_the_user() {
    let t = spawn_app().await;
    complete_login(&t, json!({})).await;
    let resp = complete_login(&t, json!({ "name": "Alice Renamed" })).await;
    let cookie = session_cookie(&resp).unwrap();
    let resp = t
        .send(
            with_cookie("GET", "/api/v1/profile", &cookie)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    let body: APIResponse<ProfileResponse> = response_json(resp).await;
    assert_eq!(body.result.identities.len(), 1);
    assert_eq!(
        body.result.identities[0].display_name.as_deref(),
        Some("Alice Renamed")
    );
}

#[tokio::test]
async fn discovery_is_fetched_once_across_logins() {
    let t = spawn_app().await;
    complete_login(&t, json!({})).await;
    complete_login(&t, json!({})).await;

    let discovery_hits = t
        .idp
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/.well-known/openid-configuration")
        .count();
    assert_eq!(discovery_hits, 1);
}
