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

//! API token scopes.
//!
//! Matching is exact string equality. The only hierarchy is the
//! [`ADMIN_WILDCARD`] scope, which grants everything; `notes:*` style
//! prefixes mean nothing.

use crate::model::Role;

pub const PROFILE_READ: &str = "profile:read";
pub const NOTES_READ: &str = "notes:read";
pub const NOTES_WRITE: &str = "notes:write";
pub const WIKI_READ: &str = "wiki:read";
pub const WIKI_WRITE: &str = "wiki:write";
pub const QUOTES_READ: &str = "quotes:read";
pub const QUOTES_WRITE: &str = "quotes:write";
pub const USERS_READ: &str = "users:read";
pub const USERS_WRITE: &str = "users:write";
pub const AUDIT_READ: &str = "audit:read";
pub const ADMIN_WILDCARD: &str = "admin:*";

const DEFAULT_USER_SCOPES: &[&str] = &[
    PROFILE_READ,
    NOTES_READ,
    NOTES_WRITE,
    WIKI_READ,
    WIKI_WRITE,
    QUOTES_READ,
    QUOTES_WRITE,
];

const ADMIN_ONLY_SCOPES: &[&str] = &[USERS_READ, USERS_WRITE, AUDIT_READ, ADMIN_WILDCARD];

pub fn default_user_scopes() -> Vec<String> {
    DEFAULT_USER_SCOPES.iter().map(|s| s.to_string()).collect()
}

pub fn admin_scopes() -> Vec<String> {
    DEFAULT_USER_SCOPES
        .iter()
        .chain(ADMIN_ONLY_SCOPES)
        .map(|s| s.to_string())
        .collect()
}

/// Scopes a user with `role` may put on a token.
pub fn allowed_for(role: Role) -> Vec<String> {
    match role {
        Role::User => default_user_scopes(),
        Role::Admin => admin_scopes(),
    }
}

/// `required` is granted by a literal entry or by the wildcard.
pub fn has_scope<S: AsRef<str>>(granted: &[S], required: &str) -> bool {
    granted
        .iter()
        .any(|s| s.as_ref() == required || s.as_ref() == ADMIN_WILDCARD)
}

/// Returns the first requested scope that `role` may not hold.
pub fn first_disallowed<'a>(role: Role, requested: &'a [String]) -> Option<&'a str> {
    let allowed = allowed_for(role);
    requested
        .iter()
        .find(|s| !allowed.contains(s))
        .map(String::as_str)
}
