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

//! Fakes shared by the OIDC unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::http::{FetchError, HttpFetcher};

enum Reply {
    Json(Value),
    Status(u16),
}

/// In-memory [`HttpFetcher`] that answers from a URL table and counts hits.
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, Reply>>,
    hits: Mutex<HashMap<String, usize>>,
    posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
    delay: Mutex<Duration>,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Json(body));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Status(status));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn posts(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.posts.lock().unwrap().clone()
    }

    async fn answer(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.routes.lock().unwrap().get(url) {
            Some(Reply::Json(v)) => Ok(serde_json::to_vec(v).unwrap()),
            Some(Reply::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
                body: String::new(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
                body: String::new(),
            }),
        }
    }
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn get(&self, url: &str, _bearer: Option<&str>) -> Result<Vec<u8>, FetchError> {
        self.answer(url).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
        self.posts.lock().unwrap().push((
            url.to_string(),
            form.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        self.answer(url).await
    }
}

pub fn discovery_json(issuer: &str) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/auth"),
        "token_endpoint": format!("{issuer}/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "jwks_uri": format!("{issuer}/jwks"),
        "response_types_supported": ["code"],
    })
}

/// RSA signing key plus its public components in JWK form.
pub struct TestKey {
    pub kid: String,
    pub encoding: EncodingKey,
    pub n: String,
    pub e: String,
}

impl TestKey {
    fn generate(kid: &str) -> Self {
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        let public_key = private_key.to_public_key();

        Self {
            kid: kid.to_string(),
            encoding,
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": self.n,
            "e": self.e,
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding).unwrap()
    }
}

/// Two keys generated once per test binary; RSA generation is slow.
pub fn keys() -> &'static (TestKey, TestKey) {
    static KEYS: OnceLock<(TestKey, TestKey)> = OnceLock::new();
    KEYS.get_or_init(|| (TestKey::generate("test-kid-1"), TestKey::generate("test-kid-2")))
}

pub fn jwks_json(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

pub fn id_token_claims(issuer: &str, client_id: &str, nonce: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "sub": "subject-123",
        "email": "user@example.com",
        "email_verified": true,
        "name": "Test User",
        "picture": "https://cdn.example/p.png",
        "iss": issuer,
        "aud": client_id,
        "iat": now,
        "exp": now + 3600,
        "nonce": nonce,
    })
}
