//! HTTP route handlers for the postrank service.
//!
//! This module contains the HTTP route handler functions that process
//! incoming requests and return appropriate responses.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::XApiError;
use crate::twitter::{post_url, TopPostsRequest, XClient};

/// Shared state of the HTTP service.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<XClient>,
    /// Bearer token required by `POST /posts`; publishing is disabled without one.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(client: XClient) -> Self {
        Self {
            client: Arc::new(client),
            api_token: None,
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(Arc::from(token.into()));
        self
    }
}

type HandlerError = (StatusCode, Json<Value>);

/// Maps an operation error to a status code and a JSON error body.
///
/// ```json
/// {
///   "status": "error",
///   "kind": "resolution_failed",
///   "message": "user @nobody not found"
/// }
/// ```
pub fn error_response(e: &XApiError) -> HandlerError {
    let status = match e {
        XApiError::ConfigurationMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
        XApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        XApiError::ResolutionFailed(_) => StatusCode::NOT_FOUND,
        XApiError::AuthExpired { .. }
        | XApiError::RefreshFailed(_)
        | XApiError::AuthorizationFailed(_) => StatusCode::UNAUTHORIZED,
        XApiError::Http { status: 429, .. } => StatusCode::TOO_MANY_REQUESTS,
        XApiError::Http { .. } | XApiError::ProtocolViolation(_) | XApiError::Transport(_) => {
            StatusCode::BAD_GATEWAY
        }
        XApiError::Signing(_) | XApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"status": "error", "kind": e.kind(), "message": e.to_string()})),
    )
}

/// Checks the `Authorization: Bearer` header of a write request.
fn authorize_write(state: &AppState, headers: &HeaderMap) -> Result<(), HandlerError> {
    let expected = state.api_token.as_deref().ok_or_else(|| {
        error_response(&XApiError::ConfigurationMissing(
            "POSTRANK_API_TOKEN is not set, publishing is disabled".to_string(),
        ))
    })?;
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    if presented == Some(expected) {
        return Ok(());
    }
    warn!("Rejected write request without a valid API token");
    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "error",
            "kind": "unauthorized",
            "message": "a valid bearer token is required",
        })),
    ))
}

/// Handles GET requests to the `/health` endpoint.
///
/// # Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "postrank"
/// }
/// ```
pub async fn handle_health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "postrank"}))
}

/// Query string of `GET /posts/top`.
#[derive(Debug, Deserialize)]
pub struct TopPostsQuery {
    pub username: Option<String>,
    pub limit: Option<usize>,
    /// `engagement` (default) or `recent`
    pub sort: Option<String>,
    /// Scan the full history before ranking
    pub all: Option<bool>,
}

/// Handles GET requests to the `/posts/top` endpoint.
///
/// Returns the author's best posts by engagement, or the most recent ones
/// with `sort=recent`.
pub async fn handle_top_posts(
    State(state): State<AppState>,
    Query(query): Query<TopPostsQuery>,
) -> Result<Json<Value>, HandlerError> {
    let username = query
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            error_response(&XApiError::InvalidInput(
                "username query parameter is required".to_string(),
            ))
        })?;

    let sort_by_engagement = match query.sort.as_deref() {
        None | Some("engagement") => true,
        Some("recent") => false,
        Some(other) => {
            return Err(error_response(&XApiError::InvalidInput(format!(
                "unknown sort '{}', expected 'engagement' or 'recent'",
                other
            ))))
        }
    };

    let mut request = TopPostsRequest::new(username);
    if let Some(limit) = query.limit {
        request.limit = limit;
    }
    request.fetch_all = query.all.unwrap_or(false);
    request.sort_by_engagement = sort_by_engagement;

    match state.client.top_posts(&request).await {
        Ok(top) => {
            info!(
                "Returning {} posts for @{}",
                top.posts.len(),
                top.author.handle
            );
            let posts: Vec<Value> = top
                .posts
                .iter()
                .map(|scored| {
                    json!({
                        "id": scored.post.id,
                        "text": scored.post.text,
                        "created_at": scored.post.created_at,
                        "metrics": scored.post.metrics.clone().unwrap_or_default(),
                        "score": scored.score,
                        "url": post_url(&scored.post.id),
                    })
                })
                .collect();
            Ok(Json(json!({
                "username": top.author.handle,
                "name": top.author.display_name,
                "fetched": top.fetched,
                "posts": posts,
            })))
        }
        Err(e) => {
            warn!("Top posts request for @{} failed: {}", request.handle, e);
            Err(error_response(&e))
        }
    }
}

/// Body of `POST /posts`.
#[derive(Debug, Deserialize)]
pub struct PublishBody {
    pub text: String,
}

/// Handles POST requests to the `/posts` endpoint.
///
/// Requires `Authorization: Bearer <POSTRANK_API_TOKEN>`.
///
/// # Success Response
///
/// ```json
/// {
///   "status": "success",
///   "id": "1790000000000000000",
///   "text": "Hello",
///   "url": "https://x.com/i/status/1790000000000000000"
/// }
/// ```
pub async fn handle_publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PublishBody>,
) -> Result<Json<Value>, HandlerError> {
    authorize_write(&state, &headers)?;
    match state.client.publish_post(&body.text).await {
        Ok(post) => {
            info!("Post published successfully");
            Ok(Json(json!({
                "status": "success",
                "id": post.id,
                "text": post.text,
                "url": post.url(),
            })))
        }
        Err(e) => {
            error!("Failed to publish post: {}", e);
            Err(error_response(&e))
        }
    }
}
