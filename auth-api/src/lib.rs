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

//! Federated authentication service library.
//!
//! Signs users in through external OpenID Connect providers (PKCE
//! authorization-code flow), links provider identities to local users, and
//! issues and validates first-party API tokens. The binary entry point
//! (`main.rs`) is a thin wrapper that calls into this library.

pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod maintenance;
pub mod model;
pub mod oidc;
pub mod policy;
pub mod routes;
pub mod scope;
pub mod secret;
pub mod service;
pub mod state;
