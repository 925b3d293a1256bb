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

//! Authentication services: the OIDC login flow, identity resolution and
//! the API token lifecycle.

pub mod auth;
pub mod identity;
pub mod token;

pub use auth::{AuthService, LoginOutcome, StartedFlow, SESSION_TTL_SECS};
pub use identity::IdentityService;
pub use token::{TokenService, TokenSettings, ValidatedToken};
