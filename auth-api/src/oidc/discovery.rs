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

//! OIDC discovery: fetching and caching `.well-known/openid-configuration`.
//!
//! One cache entry per issuer. Readers take the entry's `RwLock` for reading;
//! a miss or stale read takes the entry's refresh mutex and re-checks before
//! fetching, so concurrent misses collapse into one request. A document is
//! parsed and validated in full before it is swapped in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::AuthError;
use crate::http::HttpFetcher;

pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Provider metadata from `.well-known/openid-configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub authorization_endpoint: String,
    #[serde(default)]
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: String,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
}

impl DiscoveryDocument {
    fn validate(&self) -> Result<(), AuthError> {
        let required = [
            ("issuer", &self.issuer),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("jwks_uri", &self.jwks_uri),
        ];
        match required.iter().find(|(_, v)| v.trim().is_empty()) {
            Some((field, _)) => Err(AuthError::Discovery(format!(
                "discovery document missing {field}"
            ))),
            None => Ok(()),
        }
    }
}

/// `{issuer}/.well-known/openid-configuration` with trailing slashes on the
/// issuer removed.
pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

/// Observable state of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
}

struct Cached {
    doc: Arc<DiscoveryDocument>,
    fetched_at: Instant,
}

#[derive(Default)]
struct Entry {
    current: RwLock<Option<Cached>>,
    refresh: Mutex<()>,
}

impl Entry {
    async fn fresh(&self, ttl: Duration) -> Option<Arc<DiscoveryDocument>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < ttl)
            .map(|c| c.doc.clone())
    }
}

pub struct DiscoveryCache {
    fetcher: Arc<dyn HttpFetcher>,
    ttl: Duration,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl DiscoveryCache {
    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self::with_ttl(fetcher, DEFAULT_DISCOVERY_TTL)
    }

    pub fn with_ttl(fetcher: Arc<dyn HttpFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn entry(&self, issuer: &str) -> Arc<Entry> {
        let key = issuer.trim_end_matches('/');
        if let Some(entry) = self.entries.read().await.get(key) {
            return entry.clone();
        }
        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    pub async fn state(&self, issuer: &str) -> CacheState {
        let entry = self.entry(issuer).await;
        let current = entry.current.read().await;
        match current.as_ref() {
            None => CacheState::Empty,
            Some(c) if c.fetched_at.elapsed() < self.ttl => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    /// Cached document for `issuer`, fetching it on a miss or once stale.
    ///
    /// If the refresh fails while an older document is cached, the older
    /// document is returned.
    pub async fn get(&self, issuer: &str) -> Result<Arc<DiscoveryDocument>, AuthError> {
        let entry = self.entry(issuer).await;
        if let Some(doc) = entry.fresh(self.ttl).await {
            return Ok(doc);
        }

        let _guard = entry.refresh.lock().await;
        if let Some(doc) = entry.fresh(self.ttl).await {
            return Ok(doc);
        }

        match self.fetch(issuer).await {
            Ok(doc) => {
                let doc = Arc::new(doc);
                *entry.current.write().await = Some(Cached {
                    doc: doc.clone(),
                    fetched_at: Instant::now(),
                });
                tracing::info!(issuer = %doc.issuer, "OIDC discovery document refreshed");
                Ok(doc)
            }
            Err(err) => match entry.current.read().await.as_ref() {
                Some(stale) => {
                    tracing::warn!(issuer, "serving stale discovery document: {err}");
                    Ok(stale.doc.clone())
                }
                None => Err(err),
            },
        }
    }

    async fn fetch(&self, issuer: &str) -> Result<DiscoveryDocument, AuthError> {
        let url = discovery_url(issuer);
        let body = self
            .fetcher
            .get(&url, None)
            .await
            .map_err(|e| AuthError::Discovery(e.to_string()))?;
        let doc: DiscoveryDocument = serde_json::from_slice(&body)
            .map_err(|e| AuthError::Discovery(format!("malformed discovery document: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::test_support::{discovery_json, FakeFetcher};

    const ISSUER: &str = "https://idp.example";

    fn fetcher_with_doc() -> Arc<FakeFetcher> {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(&discovery_url(ISSUER), discovery_json(ISSUER));
        fetcher
    }

    #[test]
    fn trailing_slashes_are_stripped() {
        assert_eq!(
            discovery_url("https://idp.example//"),
            "https://idp.example/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn fresh_document_is_served_from_cache() {
        let fetcher = fetcher_with_doc();
        let cache = DiscoveryCache::new(fetcher.clone());
        assert_eq!(cache.state(ISSUER).await, CacheState::Empty);

        let first = cache.get(ISSUER).await.unwrap();
        let second = cache.get(&format!("{ISSUER}/")).await.unwrap();

        assert_eq!(first.token_endpoint, "https://idp.example/token");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.hits(&discovery_url(ISSUER)), 1);
        assert_eq!(cache.state(ISSUER).await, CacheState::Fresh);
    }

    #[tokio::test]
    async fn concurrent_cold_callers_share_one_fetch() {
        let fetcher = fetcher_with_doc();
        fetcher.set_delay(Duration::from_millis(50));
        let cache = Arc::new(DiscoveryCache::new(fetcher.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(ISSUER).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(fetcher.hits(&discovery_url(ISSUER)), 1);
    }

    #[tokio::test]
    async fn missing_required_field_is_rejected() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(
            &discovery_url(ISSUER),
            serde_json::json!({
                "issuer": ISSUER,
                "authorization_endpoint": "https://idp.example/auth",
                "token_endpoint": "https://idp.example/token"
            }),
        );
        let cache = DiscoveryCache::new(fetcher);

        let err = cache.get(ISSUER).await.unwrap_err();
        assert!(matches!(err, AuthError::Discovery(msg) if msg.contains("jwks_uri")));
        assert_eq!(cache.state(ISSUER).await, CacheState::Empty);
    }

    #[tokio::test]
    async fn stale_document_survives_failed_refresh() {
        let fetcher = fetcher_with_doc();
        let cache = DiscoveryCache::with_ttl(fetcher.clone(), Duration::ZERO);
        let first = cache.get(ISSUER).await.unwrap();
        assert_eq!(cache.state(ISSUER).await, CacheState::Stale);

        fetcher.fail(&discovery_url(ISSUER), 503);
        let second = cache.get(ISSUER).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.hits(&discovery_url(ISSUER)), 2);
    }

    #[tokio::test]
    async fn failure_with_empty_cache_is_an_error() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.fail(&discovery_url(ISSUER), 500);
        let cache = DiscoveryCache::new(fetcher);

        assert!(matches!(
            cache.get(ISSUER).await,
            Err(AuthError::Discovery(_))
        ));
    }
}
