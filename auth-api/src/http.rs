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

//! Outbound HTTP used to talk to identity providers.
//!
//! All provider traffic (discovery, JWKS, token endpoint, UserInfo) goes
//! through [`HttpFetcher`] so the caches and providers can be exercised with
//! counting fakes. Requests run inside the caller's future: dropping it
//! aborts the request.

use std::time::Duration;

use async_trait::async_trait;

/// Default bound on a single provider request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {detail}")]
    Transport { url: String, detail: String },
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url`, optionally with `Authorization: Bearer`, returning the body
    /// of a 2xx response.
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>, FetchError>;

    /// POST an `application/x-www-form-urlencoded` body, returning the body of
    /// a 2xx response.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, FetchError>;
}

/// [`HttpFetcher`] backed by a shared `reqwest::Client` with a request timeout.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                detail: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn finish(url: &str, resp: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            detail: err.to_string(),
        }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>, FetchError> {
        let mut req = self.client.get(url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| classify(url, e))?;
        Self::finish(url, resp).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| classify(url, e))?;
        Self::finish(url, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_sends_bearer_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let body = fetcher
            .get(&format!("{}/userinfo", server.uri()), Some("at-123"))
            .await
            .unwrap();
        assert_eq!(body, b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let err = fetcher.get(&server.uri(), None).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(Duration::from_millis(50)).unwrap();
        let err = fetcher.get(&server.uri(), None).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "{err}");
    }
}
