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

//! Shared test helpers for auth-api integration tests.
//!
//! Every test gets its own in-memory store, a manual clock and a `wiremock`
//! server playing the identity provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use auth_api::clock::ManualClock;
use auth_api::config::Config;
use auth_api::db::memory::MemoryStore;
use auth_api::db::UserStore;
use auth_api::http::ReqwestFetcher;
use auth_api::model::{Role, User};
use auth_api::{audit::ClientInfo, routes, state::AppState};
use axum::body::Body;
use axum::http::{self, header, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROVIDER: &str = "mock";
pub const CLIENT_ID: &str = "test-client";
pub const AFTER_LOGIN_URL: &str = "/home";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub idp: MockServer,
}

impl TestApp {
    pub fn issuer(&self) -> String {
        self.idp.uri()
    }

    pub async fn send(&self, req: http::Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }
}

struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    n: String,
    e: String,
}

/// Generated once per test binary; RSA generation is slow.
fn signing_key() -> &'static SigningKey {
    static KEY: OnceLock<SigningKey> = OnceLock::new();
    KEY.get_or_init(|| {
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_key = private_key.to_public_key();
        SigningKey {
            kid: "integration-kid".to_string(),
            encoding: EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    })
}

pub fn sign_id_token(claims: &Value) -> String {
    let key = signing_key();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key.kid.clone());
    encode(&header, claims, &key.encoding).unwrap()
}

/// Standard claims for `nonce`, as the mock provider would issue them.
pub fn id_token_claims(issuer: &str, nonce: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": "idp-user-1",
        "email": "alice@example.com",
        "email_verified": true,
        "name": "Alice Example",
        "iss": issuer,
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + 3600,
        "nonce": nonce,
    })
}

async fn start_idp() -> MockServer {
    let idp = MockServer::start().await;
    let issuer = idp.uri();
    let key = signing_key();

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/authorize"),
            "token_endpoint": format!("{issuer}/token"),
            "userinfo_endpoint": format!("{issuer}/userinfo"),
            "jwks_uri": format!("{issuer}/jwks"),
            "response_types_supported": ["code"],
        })))
        .mount(&idp)
        .await;

    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{
                "kty": "RSA",
                "kid": key.kid,
                "use": "sig",
                "alg": "RS256",
                "n": key.n,
                "e": key.e,
            }]
        })))
        .mount(&idp)
        .await;

    idp
}

/// Make the next token-endpoint call return an ID token with `claims`.
pub async fn mount_token_response(idp: &MockServer, claims: &Value) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "idp-access-token",
            "token_type": "Bearer",
            "id_token": sign_id_token(claims),
            "expires_in": 3600,
        })))
        .up_to_n_times(1)
        .mount(idp)
        .await;
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(&[]).await
}

/// Build the router against a fresh store and mock provider. `extra`
/// overrides or adds configuration variables.
pub async fn spawn_app_with(extra: &[(&str, &str)]) -> TestApp {
    let idp = start_idp().await;
    let issuer = idp.uri();

    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://unused"),
        ("PUBLIC_BASE_URL", "http://app.test"),
        ("AFTER_LOGIN_URL", AFTER_LOGIN_URL),
        ("COOKIE_SECURE", "false"),
        ("OIDC_PROVIDERS", PROVIDER),
        ("OIDC_MOCK_ISSUER", issuer.as_str()),
        ("OIDC_MOCK_CLIENT_ID", CLIENT_ID),
        ("OIDC_MOCK_CLIENT_SECRET", "test-secret"),
    ]
    .iter()
    .chain(extra.iter())
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    vars.retain(|_, v| !v.is_empty());
    let config = Config::from_lookup(|k| vars.get(k).cloned()).expect("test config");

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let fetcher = Arc::new(ReqwestFetcher::new(Duration::from_secs(5)).unwrap());
    let state = AppState::new(store.clone(), &config, fetcher, clock.clone()).unwrap();

    TestApp {
        app: routes::router().with_state(state.clone()),
        state,
        store,
        clock,
        idp,
    }
}

pub fn get(uri: &str) -> http::Request<Body> {
    http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Request with `Authorization: Bearer <token>`.
pub fn with_bearer(method: &str, uri: &str, token: &str) -> http::request::Builder {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
}

/// Request with `Cookie: session=<token>`.
pub fn with_cookie(method: &str, uri: &str, token: &str) -> http::request::Builder {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("session={token}"))
}

pub fn json_body(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

/// Create a user directly in the store and issue them a token.
pub async fn seed_user(t: &TestApp, role: Role, scopes: &[&str]) -> (User, String) {
    let user = User {
        id: Uuid::new_v4(),
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        display_name: "Seeded User".to_string(),
        role,
        active: true,
        password_hash: None,
        created_at: Utc::now(),
    };
    t.store.create_user(&user).await.unwrap();
    let issued = t
        .state
        .tokens
        .create(
            user.id,
            "seed",
            scopes.iter().map(|s| s.to_string()).collect(),
            None,
            user.id,
            &ClientInfo::default(),
        )
        .await
        .unwrap();
    (user, issued.plaintext.into_inner())
}

pub fn location(resp: &Response) -> String {
    resp.headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn query_params(url: &str) -> HashMap<String, String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

/// The `session` cookie value from a response's `Set-Cookie`.
pub fn session_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Start a login and return `(state, nonce)` from the authorization URL.
pub async fn start_login(t: &TestApp, return_to: Option<&str>) -> (String, String) {
    let uri = match return_to {
        Some(r) => format!("/auth/{PROVIDER}/login?returnTo={r}"),
        None => format!("/auth/{PROVIDER}/login"),
    };
    let resp = t.send(get(&uri)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let params = query_params(&location(&resp));
    (params["state"].clone(), params["nonce"].clone())
}

/// Drive a full browser login with the given claims patch applied on top
/// of [`id_token_claims`]. Returns the callback response.
pub async fn complete_login(t: &TestApp, patch: Value) -> Response {
    let (state, nonce) = start_login(t, None).await;
    let mut claims = id_token_claims(&t.issuer(), &nonce);
    if let (Some(base), Some(patch)) = (claims.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            base.insert(k.clone(), v.clone());
        }
    }
    mount_token_response(&t.idp, &claims).await;
    t.send(get(&format!("/auth/callback?state={state}&code=auth-code")))
        .await
}

/// Consume a response body and deserialize JSON into `T`.
pub async fn response_json<T: DeserializeOwned>(resp: Response) -> T {
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("deserialize response body")
}
