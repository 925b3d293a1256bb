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

//! Name → provider map, built once at startup and read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AuthError;
use crate::http::HttpFetcher;

use super::discovery::DiscoveryCache;
use super::jwks::JwksCache;
use super::provider::{OidcProvider, Provider, ProviderConfig};

pub struct RegisteredProvider {
    pub provider: Arc<dyn Provider>,
    pub config: ProviderConfig,
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`OidcProvider`] per config, all sharing the given caches. Fails
    /// on the first config without an issuer or client id.
    pub fn from_configs(
        configs: Vec<ProviderConfig>,
        discovery: Arc<DiscoveryCache>,
        jwks: Arc<JwksCache>,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Result<Self, AuthError> {
        let mut registry = Self::new();
        for mut config in configs {
            config.name = config.name.trim().to_ascii_lowercase();
            let provider = OidcProvider::new(
                &config,
                discovery.clone(),
                jwks.clone(),
                fetcher.clone(),
            );
            registry.register(Arc::new(provider), config)?;
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        provider: Arc<dyn Provider>,
        config: ProviderConfig,
    ) -> Result<(), AuthError> {
        let name = config.name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(AuthError::Config("provider name is empty".into()));
        }
        if config.issuer.trim().is_empty() {
            return Err(AuthError::Config(format!("provider {name} has no issuer")));
        }
        if config.client_id.trim().is_empty() {
            return Err(AuthError::Config(format!("provider {name} has no client id")));
        }
        if self.providers.contains_key(&name) {
            return Err(AuthError::Config(format!("provider {name} registered twice")));
        }
        tracing::info!(provider = %name, issuer = %config.issuer, "registered identity provider");
        let config = ProviderConfig { name: name.clone(), ..config };
        self.providers
            .insert(name, RegisteredProvider { provider, config });
        Ok(())
    }

    /// Lookup is case-insensitive.
    pub fn get(&self, name: &str) -> Result<&RegisteredProvider, AuthError> {
        self.providers
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| AuthError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
