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

//! ID token claims, the validated [`Claims`] view, and the UserInfo fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AuthError;
use crate::http::HttpFetcher;

use super::provider::ProviderKind;

/// Claims as they appear in a verified ID token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Some providers send `"true"` as a string.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub iss: String,
    /// A single string or an array.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
    /// Google Workspace hosted domain.
    #[serde(default)]
    pub hd: Option<String>,
    /// Microsoft tenant id.
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    Ok(
        match Option::<BoolOrString>::deserialize(deserializer)? {
            Some(BoolOrString::Bool(b)) => Some(b),
            Some(BoolOrString::String(s)) => Some(s.eq_ignore_ascii_case("true")),
            None => None,
        },
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn audiences(aud: Option<serde_json::Value>) -> Vec<String> {
    match aud {
        Some(serde_json::Value::String(s)) => vec![s],
        Some(serde_json::Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Identity assertions from a verified ID token, normalized across providers.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    pub picture: Option<String>,
    pub issuer: String,
    pub audience: Vec<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    /// Google `hd`.
    pub hosted_domain: Option<String>,
    /// Microsoft `tid` or a generic `org` claim.
    pub organization: Option<String>,
    pub nonce: Option<String>,
}

impl Claims {
    pub fn from_id_token(raw: IdTokenClaims, kind: ProviderKind) -> Self {
        let email = non_empty(raw.email).unwrap_or_default();
        let name = display_name(
            raw.name.as_deref(),
            raw.given_name.as_deref(),
            raw.family_name.as_deref(),
            &email,
        );
        let (hosted_domain, organization) = match kind {
            ProviderKind::Google => (non_empty(raw.hd), None),
            ProviderKind::Microsoft => (None, non_empty(raw.tid)),
            ProviderKind::Generic => (None, non_empty(raw.org)),
        };

        Self {
            subject: raw.sub,
            email,
            email_verified: raw.email_verified.unwrap_or(false),
            name,
            picture: non_empty(raw.picture),
            issuer: raw.iss,
            audience: audiences(raw.aud),
            issued_at: raw.iat.and_then(|t| DateTime::from_timestamp(t, 0)),
            expires_at: raw
                .exp
                .and_then(|t| DateTime::from_timestamp(t, 0))
                .unwrap_or(DateTime::UNIX_EPOCH),
            hosted_domain,
            organization,
            nonce: raw.nonce,
        }
    }

    /// Subject, email, issuer and audience are present and `now` is before
    /// `expires_at`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check(now).is_ok()
    }

    /// Like [`Claims::is_valid`], naming the first failed condition.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), AuthError> {
        if self.subject.is_empty() {
            return Err(AuthError::InvalidClaims("missing subject".into()));
        }
        if self.email.is_empty() {
            return Err(AuthError::InvalidClaims("missing email".into()));
        }
        if self.issuer.is_empty() {
            return Err(AuthError::InvalidClaims("missing issuer".into()));
        }
        if self.audience.iter().all(|a| a.is_empty()) {
            return Err(AuthError::InvalidClaims("missing audience".into()));
        }
        if now >= self.expires_at {
            return Err(AuthError::InvalidClaims("token expired".into()));
        }
        Ok(())
    }

    /// Fill fields the ID token left empty. A UserInfo response for a
    /// different subject is ignored.
    pub fn merge_userinfo(&mut self, info: UserInfo) {
        if info.sub.as_deref().is_some_and(|s| s != self.subject) {
            tracing::warn!("UserInfo subject does not match ID token; ignoring");
            return;
        }
        let had_email = !self.email.is_empty();
        if !had_email {
            if let Some(email) = non_empty(info.email) {
                self.email = email;
                self.email_verified = info.email_verified.unwrap_or(false);
            }
        }
        if self.name.is_empty() || (!had_email && self.name == self.email) {
            self.name = display_name(
                info.name.as_deref(),
                info.given_name.as_deref(),
                info.family_name.as_deref(),
                &self.email,
            );
        }
        if self.picture.is_none() {
            self.picture = non_empty(info.picture);
        }
    }
}

/// `name`, else `given_name family_name`, else the email.
pub fn display_name(
    name: Option<&str>,
    given_name: Option<&str>,
    family_name: Option<&str>,
    email: &str,
) -> String {
    if let Some(n) = name.map(str::trim).filter(|n| !n.is_empty()) {
        return n.to_string();
    }
    let given = given_name.map(str::trim).unwrap_or_default();
    let family = family_name.map(str::trim).unwrap_or_default();
    match (given.is_empty(), family.is_empty()) {
        (false, false) => format!("{given} {family}"),
        (false, true) => given.to_string(),
        (true, false) => family.to_string(),
        (true, true) => email.to_string(),
    }
}

/// Response from the OIDC UserInfo endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Fetch the UserInfo document with the access token as bearer.
pub async fn fetch_userinfo(
    fetcher: &dyn HttpFetcher,
    userinfo_endpoint: &str,
    access_token: &str,
) -> Result<UserInfo, AuthError> {
    let body = fetcher.get(userinfo_endpoint, Some(access_token)).await?;
    serde_json::from_slice(&body)
        .map_err(|e| AuthError::InvalidClaims(format!("malformed UserInfo response: {e}")))
}
