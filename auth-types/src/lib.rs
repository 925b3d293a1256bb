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

//! Shared API types for the federated authentication service.
//!
//! This crate defines the API contract between the auth backend and its
//! consumers (browser frontend, bots, integration tests). It is intentionally
//! framework-agnostic: no axum, no database types, no crypto.

pub mod error;
pub mod requests;
pub mod responses;

pub use error::APIError;
pub use responses::APIResponse;
