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

//! Sign-in allowlist, consulted only after the ID token's claims are valid.

/// Optional domain/user gate. With both lists empty everybody is allowed.
#[derive(Debug, Clone, Default)]
pub struct AllowlistPolicy {
    allowed_domains: Vec<String>,
    allowed_users: Vec<String>,
}

impl AllowlistPolicy {
    pub fn new(allowed_domains: Vec<String>, allowed_users: Vec<String>) -> Self {
        Self {
            allowed_domains: normalize(allowed_domains),
            allowed_users: normalize(allowed_users),
        }
    }

    pub fn is_open(&self) -> bool {
        self.allowed_domains.is_empty() && self.allowed_users.is_empty()
    }

    pub fn is_user_allowed(&self, email: &str, hosted_domain: Option<&str>) -> bool {
        is_user_allowed(
            email,
            hosted_domain,
            &self.allowed_domains,
            &self.allowed_users,
        )
    }
}

fn normalize(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Allowed if both lists are empty, if `email` is an allowed user, if the
/// part after the `@` is an allowed domain, or if the provider-asserted
/// `hosted_domain` is an allowed domain. Comparisons ignore ASCII case.
pub fn is_user_allowed(
    email: &str,
    hosted_domain: Option<&str>,
    allowed_domains: &[String],
    allowed_users: &[String],
) -> bool {
    if allowed_domains.is_empty() && allowed_users.is_empty() {
        return true;
    }

    if allowed_users.iter().any(|u| u.eq_ignore_ascii_case(email)) {
        return true;
    }

    if let Some((_, domain)) = email.rsplit_once('@') {
        if allowed_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
        {
            return true;
        }
    }

    hosted_domain.is_some_and(|hd| allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(hd)))
}
