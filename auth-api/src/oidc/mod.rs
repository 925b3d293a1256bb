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

//! OpenID Connect federation: discovery and JWKS caches, ID token
//! verification, claims, PKCE, code exchange, and the per-provider strategy.

pub mod claims;
pub mod discovery;
pub mod exchange;
pub mod jwks;
pub mod pkce;
pub mod provider;
pub mod registry;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{Claims, IdTokenClaims, UserInfo};
pub use discovery::{CacheState, DiscoveryCache, DiscoveryDocument};
pub use exchange::TokenSet;
pub use jwks::{JwksCache, RsaJwk};
pub use provider::{AuthorizationRequest, OidcProvider, Provider, ProviderConfig, ProviderKind};
pub use registry::{ProviderRegistry, RegisteredProvider};
