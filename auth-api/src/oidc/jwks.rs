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

//! JWKS (JSON Web Key Set) cache with single-flight refresh and rotation
//! recovery.
//!
//! A lookup refreshes an empty or expired key set first. If the `kid` is
//! still unknown it forces one more refresh, since the provider may have
//! rotated keys after the set was fetched. At most one forced refresh runs
//! per cooldown window.
//!
//! Each key set carries a generation number that counts refresh attempts.
//! A caller that waited on the refresh mutex while someone else refreshed
//! sees the generation move and skips its own fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::AuthError;
use crate::http::HttpFetcher;

pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(60 * 60);

/// Minimum spacing between two forced (unknown `kid`) refreshes.
pub const DEFAULT_FORCED_REFRESH_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// A usable RSA signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaJwk {
    pub kid: String,
    pub algorithm: Algorithm,
    /// Big-endian modulus bytes.
    pub modulus: Vec<u8>,
    /// Big-endian exponent bytes.
    pub exponent: Vec<u8>,
}

impl RsaJwk {
    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_rsa_raw_components(&self.modulus, &self.exponent)
    }
}

fn rsa_algorithm(alg: Option<&str>) -> Option<Algorithm> {
    match alg {
        None | Some("RS256") => Some(Algorithm::RS256),
        Some("RS384") => Some(Algorithm::RS384),
        Some("RS512") => Some(Algorithm::RS512),
        Some("PS256") => Some(Algorithm::PS256),
        Some("PS384") => Some(Algorithm::PS384),
        Some("PS512") => Some(Algorithm::PS512),
        Some(_) => None,
    }
}

/// Exponent bytes as an integer, big-endian. `None` for empty or wider than
/// 64 bits.
fn exponent_value(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn parse_entry(value: serde_json::Value) -> Option<RsaJwk> {
    let jwk: JwkEntry = serde_json::from_value(value).ok()?;
    if jwk.kty != "RSA" {
        return None;
    }
    if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
        return None;
    }
    let kid = jwk.kid.filter(|k| !k.is_empty())?;
    let algorithm = rsa_algorithm(jwk.alg.as_deref())?;

    let modulus = URL_SAFE_NO_PAD
        .decode(jwk.n.as_deref().unwrap_or_default())
        .ok()
        .filter(|n| !n.is_empty())?;
    let exponent = URL_SAFE_NO_PAD
        .decode(jwk.e.as_deref().unwrap_or_default())
        .ok()?;
    // Wider exponents are not valid RSA public exponents.
    exponent_value(&exponent)?;

    Some(RsaJwk {
        kid,
        algorithm,
        modulus,
        exponent,
    })
}

/// Parse a JWKS document, keeping only usable RSA signing keys.
pub fn parse_jwks(body: &[u8]) -> Result<HashMap<String, RsaJwk>, AuthError> {
    let doc: JwksDocument = serde_json::from_slice(body)
        .map_err(|e| AuthError::Jwks(format!("malformed JWKS document: {e}")))?;
    let total = doc.keys.len();
    let keys: HashMap<String, RsaJwk> = doc
        .keys
        .into_iter()
        .filter_map(parse_entry)
        .map(|k| (k.kid.clone(), k))
        .collect();
    if keys.len() < total {
        tracing::debug!(
            usable = keys.len(),
            total,
            "skipped JWKS entries that are not RSA signing keys"
        );
    }
    Ok(keys)
}

struct KeySet {
    keys: HashMap<String, RsaJwk>,
    fetched_at: Instant,
}

#[derive(Default)]
struct RefreshState {
    last_forced: Option<Instant>,
}

#[derive(Default)]
struct Entry {
    current: RwLock<Option<Arc<KeySet>>>,
    refresh: Mutex<RefreshState>,
    generation: AtomicU64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Key set empty or past its TTL.
    Expired,
    /// Key set fresh but missing the requested `kid`.
    Forced,
}

pub struct JwksCache {
    fetcher: Arc<dyn HttpFetcher>,
    ttl: Duration,
    cooldown: Duration,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl JwksCache {
    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self::with_settings(fetcher, DEFAULT_JWKS_TTL, DEFAULT_FORCED_REFRESH_COOLDOWN)
    }

    pub fn with_settings(fetcher: Arc<dyn HttpFetcher>, ttl: Duration, cooldown: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cooldown,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn entry(&self, jwks_uri: &str) -> Arc<Entry> {
        if let Some(entry) = self.entries.read().await.get(jwks_uri) {
            return entry.clone();
        }
        self.entries
            .write()
            .await
            .entry(jwks_uri.to_string())
            .or_default()
            .clone()
    }

    /// Signing key `kid` from the set at `jwks_uri`.
    pub async fn get_key(&self, jwks_uri: &str, kid: &str) -> Result<RsaJwk, AuthError> {
        let entry = self.entry(jwks_uri).await;

        let (set, generation) = snapshot(&entry).await;
        let fresh = set
            .as_ref()
            .is_some_and(|s| s.fetched_at.elapsed() < self.ttl);

        let generation = if fresh {
            if let Some(key) = set.as_ref().and_then(|s| s.keys.get(kid)) {
                return Ok(key.clone());
            }
            generation
        } else {
            self.refresh(&entry, jwks_uri, generation, Refresh::Expired)
                .await?;
            let (set, generation) = snapshot(&entry).await;
            if let Some(key) = set.as_ref().and_then(|s| s.keys.get(kid)) {
                return Ok(key.clone());
            }
            generation
        };

        self.refresh(&entry, jwks_uri, generation, Refresh::Forced)
            .await?;
        let (set, _) = snapshot(&entry).await;
        set.as_ref()
            .and_then(|s| s.keys.get(kid))
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    /// Refresh unless another caller already did since `seen_generation`.
    ///
    /// Returns an error only when the fetch failed and nothing is cached.
    async fn refresh(
        &self,
        entry: &Entry,
        jwks_uri: &str,
        seen_generation: u64,
        kind: Refresh,
    ) -> Result<(), AuthError> {
        let mut state = entry.refresh.lock().await;
        if entry.generation.load(Ordering::Acquire) != seen_generation {
            return Ok(());
        }
        if kind == Refresh::Forced {
            if let Some(last) = state.last_forced {
                if last.elapsed() < self.cooldown {
                    tracing::debug!(jwks_uri, "forced JWKS refresh suppressed by cooldown");
                    return Ok(());
                }
            }
            state.last_forced = Some(Instant::now());
        }

        let result = self.fetch(jwks_uri).await;
        entry.generation.fetch_add(1, Ordering::AcqRel);
        match result {
            Ok(keys) => {
                tracing::info!(jwks_uri, keys = keys.len(), "JWKS refreshed");
                *entry.current.write().await = Some(Arc::new(KeySet {
                    keys,
                    fetched_at: Instant::now(),
                }));
                Ok(())
            }
            Err(err) => {
                if entry.current.read().await.is_some() {
                    tracing::warn!(jwks_uri, "serving stale JWKS: {err}");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn fetch(&self, jwks_uri: &str) -> Result<HashMap<String, RsaJwk>, AuthError> {
        let body = self
            .fetcher
            .get(jwks_uri, None)
            .await
            .map_err(|e| AuthError::Jwks(e.to_string()))?;
        parse_jwks(&body)
    }
}

async fn snapshot(entry: &Entry) -> (Option<Arc<KeySet>>, u64) {
    let current = entry.current.read().await;
    (current.clone(), entry.generation.load(Ordering::Acquire))
}
