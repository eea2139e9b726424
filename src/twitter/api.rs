//! Core X API utilities.
//!
//! [`XClient`] owns the HTTP client, the explicit configuration and the token
//! manager. Every request goes through [`XClient::send_authorized`], which
//! signs it for the operation's credentials and refreshes delegated tokens at
//! most once on 401/403.

use log::{debug, error, info};
use reqwest::{Client, Method};

use crate::config::{Credentials, XApiConfig};
use crate::error::{XApiError, XApiResult};
use crate::oauth::authorization_header;
use crate::tokens::{AuthSession, TokenManager, TokenStore};

/// Sanitizes text for safe logging by truncating and escaping control characters.
///
/// # Parameters
///
/// - `text`: The text to sanitize
/// - `max_len`: Maximum number of characters before truncation
///
/// # Returns
///
/// A sanitized string safe for logging
pub(crate) fn sanitize_for_logging(text: &str, max_len: usize) -> String {
    // Replace control characters and newlines to prevent log injection
    let sanitized: Vec<char> = text
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '?',
            c => c,
        })
        .collect();

    if sanitized.len() > max_len {
        format!(
            "{}... [truncated, {} total bytes]",
            sanitized[..max_len].iter().collect::<String>(),
            text.len()
        )
    } else {
        sanitized.into_iter().collect()
    }
}

/// A single request against the X API, relative to the configured base URL.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

/// Client for the X API v2.
#[derive(Debug)]
pub struct XClient {
    http: Client,
    config: XApiConfig,
    tokens: TokenManager,
}

impl XClient {
    /// Creates a client that keeps refreshed tokens in memory.
    pub fn new(config: XApiConfig) -> Self {
        Self::with_store(config, TokenStore::memory())
    }

    /// Creates a client that keeps refreshed tokens in `store`.
    pub fn with_store(config: XApiConfig, store: TokenStore) -> Self {
        let http = Client::new();
        let tokens = TokenManager::new(http.clone(), config.token_url.clone(), store);
        Self {
            http,
            config,
            tokens,
        }
    }

    pub fn config(&self) -> &XApiConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Starts a read operation. Fails with `ConfigurationMissing` before any network call.
    pub(crate) async fn read_session(&self) -> XApiResult<AuthSession> {
        let credentials = self.config.read_credentials()?;
        debug!("Read operation uses {} credentials", credentials.scheme());
        Ok(self.tokens.snapshot(credentials).await)
    }

    /// Starts a write operation. Fails with `ConfigurationMissing` before any network call.
    pub(crate) async fn write_session(&self) -> XApiResult<AuthSession> {
        let credentials = self.config.write_credentials()?;
        debug!("Write operation uses {} credentials", credentials.scheme());
        Ok(self.tokens.snapshot(credentials).await)
    }

    /// Sends `request` with the session's credentials and returns the 2xx body.
    ///
    /// A 401/403 triggers at most one token refresh per session.
    pub(crate) async fn send_authorized(
        &self,
        session: &mut AuthSession,
        request: &ApiRequest,
        operation: &str,
    ) -> XApiResult<String> {
        self.tokens
            .with_refresh(session, operation, |credentials| {
                self.send_once(credentials, request, operation)
            })
            .await
    }

    async fn send_once(
        &self,
        credentials: Credentials,
        request: &ApiRequest,
        operation: &str,
    ) -> XApiResult<String> {
        let url = format!("{}{}", self.config.api_base, request.path);
        info!(
            "Making authenticated request for operation: {} ({} {})",
            operation, request.method, request.path
        );

        // JSON bodies are not part of the OAuth 1.0a signature base
        let auth_header =
            authorization_header(&credentials, request.method.as_str(), &url, &request.query)?;

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header("Authorization", auth_header);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        info!(
            "Received response with status: {} for operation: {}",
            status, operation
        );

        let text = response.text().await?;
        if status.is_success() {
            debug!(
                "Response summary for '{}': {} bytes received",
                operation,
                text.len()
            );
            return Ok(text);
        }

        error!("Operation '{}' failed - Status: {}", operation, status);
        debug!(
            "Error response for '{}': {}",
            operation,
            sanitize_for_logging(&text, 200)
        );
        Err(XApiError::from_status(
            operation,
            status.as_u16(),
            sanitize_for_logging(&text, 500),
        ))
    }
}
