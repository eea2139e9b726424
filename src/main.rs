//! # Postrank
//!
//! HTTP service around the X API client: fetch a user's top posts, publish
//! posts, and (when configured) send a scheduled best posts digest.
//!
//! ## Environment Variables
//!
//! - X API credentials, see [`XApiConfig::from_env`]
//! - `DATABASE_URL` + `TOKEN_ENCRYPTION_KEY`: persist refreshed tokens (optional)
//! - `DIGEST_USERNAME`, `TELEGRAM_BOT_TOKEN`, `TELEGRAM_TARGET_CHAT_ID`: enable the digest job
//! - `POSTRANK_API_TOKEN`: bearer token required by `POST /posts` (publishing is disabled without it)
//! - `PORT`: Server port (defaults to 3000)
//!
//! ## API Endpoints
//!
//! - `GET /health`: Returns service health status
//! - `GET /posts/top?username=...&limit=...&sort=...&all=...`: Top posts by engagement
//! - `POST /posts`: Publishes `{"text": "..."}` (needs `Authorization: Bearer <POSTRANK_API_TOKEN>`)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use postrank::handlers::{handle_health, handle_publish, handle_top_posts, AppState};
use postrank::{
    get_api_token, get_server_port, start_digest_cronjob, DigestConfig, DigestSink, TokenStore,
    XApiConfig, XClient,
};

/// Main entry point for the postrank web service.
///
/// Initializes logging, builds the client from the environment, starts the
/// digest job when it is configured and serves HTTP until terminated.
///
/// # Example Usage
///
/// ```bash
/// # Run with default port 3000
/// cargo run
///
/// # Run with debug logging
/// RUST_LOG=debug PORT=8080 cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize the logging system
    env_logger::init();

    let config = XApiConfig::from_env();
    let store = TokenStore::from_env().await?;
    let mut state = AppState::new(XClient::with_store(config, store));
    match get_api_token() {
        Some(token) => state = state.with_api_token(token),
        None => warn!("POSTRANK_API_TOKEN is not set - POST /posts is disabled"),
    }

    // The digest job only runs when its settings are present
    let cronjob_handle = match DigestConfig::from_env() {
        Ok(digest) => {
            let client = Arc::clone(&state.client);
            let sink = DigestSink::telegram(&digest);
            Some(tokio::spawn(async move {
                match start_digest_cronjob(client, digest, sink).await {
                    Ok(scheduler) => {
                        info!("Starting best posts digest cronjob");
                        if let Err(e) = scheduler.start().await {
                            error!("Failed to start cronjob scheduler: {}", e);
                            return;
                        }
                        // Keep the scheduler running indefinitely
                        loop {
                            tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                        }
                    }
                    Err(e) => {
                        error!("Failed to create cronjob scheduler: {}", e);
                    }
                }
            }))
        }
        Err(e) => {
            info!("Digest cronjob disabled: {}", e);
            None
        }
    };

    // Build the HTTP application with all routes and middleware
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/posts/top", get(handle_top_posts))
        .route("/posts", post(handle_publish))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let port = get_server_port();
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    info!("Starting postrank server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    if let Err(e) = axum::serve(listener, app).await {
        error!("HTTP server error: {}", e);
    }
    if let Some(handle) = cronjob_handle {
        handle.abort();
    }

    Ok(())
}
