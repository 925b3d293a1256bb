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

//! Browser login routes: login, callback, logout.
//!
//! After a successful login the callback issues an API token inside an
//! `HttpOnly; SameSite=Lax` cookie named `session`. JavaScript cannot read
//! the cookie; the browser sends it automatically.

use auth_types::requests::{CallbackQuery, LoginQuery};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
};

use crate::auth::{RequestAuth, SESSION_COOKIE};
use crate::error::{AppError, AuthError};
use crate::state::{AppState, WebSettings};

// ---------------------------------------------------------------------------
// Cookie helpers
// ---------------------------------------------------------------------------

fn build_session_cookie(token: &str, web: &WebSettings) -> String {
    cookie_with_attributes(
        format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            web.session_ttl_secs
        ),
        web,
    )
}

fn build_clear_session_cookie(web: &WebSettings) -> String {
    cookie_with_attributes(
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
        web,
    )
}

fn cookie_with_attributes(mut cookie: String, web: &WebSettings) -> String {
    if web.cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Some(d) = &web.cookie_domain {
        cookie.push_str(&format!("; Domain={d}"));
    }
    cookie
}

fn with_cookie(mut response: Response, cookie: &str) -> Result<Response, AppError> {
    let value =
        HeaderValue::from_str(cookie).map_err(|_| AppError::internal("invalid cookie value"))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

/// Only same-site relative paths are honoured as post-login destinations.
fn safe_return_to(return_to: Option<String>) -> Option<String> {
    return_to.filter(|p| p.starts_with('/') && !p.starts_with("//") && !p.contains('\\'))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /auth/{provider}/login?returnTo=<path>
///
/// Starts the authorization-code flow and redirects to the identity provider.
pub async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<LoginQuery>,
    auth: RequestAuth,
) -> Result<Response, AppError> {
    let flow = state
        .auth
        .start_oidc_flow(
            &provider,
            &state.web.callback_url,
            &[],
            safe_return_to(query.return_to),
            &auth.client,
        )
        .await
        .map_err(login_error)?;

    Ok(Redirect::to(flow.authorization_url.as_str()).into_response())
}

/// GET /auth/callback?state=...&code=...
///
/// Finishes the login, sets the `session` cookie and redirects to the
/// stored `returnTo` or the configured landing page.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    auth: RequestAuth,
) -> Result<Response, AppError> {
    let outcome = state
        .auth
        .finish_login(&query.state, &query.code, &auth.client)
        .await
        .map_err(login_error)?;

    let issued = state
        .tokens
        .issue_web_session(
            &outcome.user,
            chrono::Duration::seconds(state.web.session_ttl_secs),
            &auth.client,
        )
        .await
        .map_err(login_error)?;

    let redirect_url = outcome
        .session
        .return_to
        .clone()
        .unwrap_or_else(|| state.web.after_login_url.clone());

    tracing::info!(
        user_id = %outcome.user.id,
        provider = %outcome.session.provider,
        "login successful, redirecting to {redirect_url}"
    );

    with_cookie(
        Redirect::to(&redirect_url).into_response(),
        &build_session_cookie(issued.plaintext.expose(), &state.web),
    )
}

/// POST /logout -- revokes the presented token and clears the cookie.
///
/// Succeeds even without a valid token so a stale cookie can always be
/// cleared.
pub async fn logout(State(state): State<AppState>, auth: RequestAuth) -> Result<Response, AppError> {
    if auth.token().is_some() {
        match auth.authenticate(&state, None).await {
            Ok(caller) => {
                state
                    .tokens
                    .revoke(caller.token.id, &caller.user, &auth.client)
                    .await?;
            }
            Err(e) if e.status == StatusCode::UNAUTHORIZED => {}
            Err(e) => return Err(e),
        }
    }
    with_cookie(
        StatusCode::NO_CONTENT.into_response(),
        &build_clear_session_cookie(&state.web),
    )
}

/// Login failures are reported generically. Only an expired session and
/// backend faults keep their own response.
fn login_error(err: AuthError) -> AppError {
    match err {
        AuthError::SessionExpired
        | AuthError::Discovery(_)
        | AuthError::Jwks(_)
        | AuthError::Config(_)
        | AuthError::Store(_)
        | AuthError::Fetch(_) => err.into(),
        other => {
            tracing::debug!("login failed: {other}");
            AppError::authentication_failed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web(secure: bool, domain: Option<&str>) -> WebSettings {
        WebSettings {
            callback_url: "http://localhost/auth/callback".to_string(),
            after_login_url: "/".to_string(),
            cookie_domain: domain.map(str::to_string),
            cookie_secure: secure,
            session_ttl_secs: 3600,
        }
    }

    #[test]
    fn session_cookie_attributes() {
        let c = build_session_cookie("ak_x", &web(true, Some(".example.com")));
        assert!(c.starts_with("session=ak_x; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"));
        assert!(c.contains("; Secure"));
        assert!(c.ends_with("; Domain=.example.com"));

        let c = build_clear_session_cookie(&web(false, None));
        assert_eq!(c, "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    }

    #[test]
    fn return_to_must_be_a_local_path() {
        assert_eq!(safe_return_to(Some("/wiki".into())).as_deref(), Some("/wiki"));
        assert_eq!(safe_return_to(Some("//evil.example".into())), None);
        assert_eq!(safe_return_to(Some("https://evil.example".into())), None);
        assert_eq!(safe_return_to(Some("/\\evil.example".into())), None);
        assert_eq!(safe_return_to(None), None);
    }

    #[test]
    fn inactive_user_login_is_generic() {
        let err = login_error(AuthError::InactiveUser);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.body.code, "AUTHENTICATION_FAILED");
        assert_eq!(login_error(AuthError::SessionExpired).body.code, "SESSION_EXPIRED");
    }
}
