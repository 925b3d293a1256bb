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

//! Auth service entry point.
//!
//! A standalone Axum service that runs federated OIDC login and issues
//! API tokens for the rest of the platform.

use std::sync::Arc;

use auth_api::clock::SystemClock;
use auth_api::config::Config;
use auth_api::db::postgres::PgStore;
use auth_api::http::ReqwestFetcher;
use auth_api::maintenance::{self, Retention};
use auth_api::routes;
use auth_api::state::AppState;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("failed to load configuration");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to PostgreSQL");

    tracing::info!("Connected to PostgreSQL");

    let store = Arc::new(PgStore::new(pool));
    store.migrate().await.expect("failed to run migrations");

    let fetcher =
        Arc::new(ReqwestFetcher::new(config.http_timeout).expect("failed to build HTTP client"));

    let state = AppState::new(store, &config, fetcher, Arc::new(SystemClock))
        .expect("invalid identity provider configuration");

    maintenance::spawn(
        state.auth.clone(),
        state.tokens.clone(),
        Retention {
            sessions: chrono::Duration::seconds(config.session_retention_secs),
            expired_tokens: chrono::Duration::seconds(config.revoked_token_retention_secs),
            revoked_tokens: chrono::Duration::seconds(config.revoked_token_retention_secs),
        },
        config.cleanup_interval,
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router().layer(cors).with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!("Auth service listening on {}", config.listen_addr);

    axum::serve(listener, app).await.expect("server error");
}
