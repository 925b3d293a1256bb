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

//! Domain entities persisted through the store traits in [`crate::db`].

pub mod session;
pub mod token;
pub mod user;

pub use session::{FlowState, OidcSession, SessionCompletion};
pub use token::{ApiToken, IssuedToken, PlaintextToken};
pub use user::{Identity, Role, User};
