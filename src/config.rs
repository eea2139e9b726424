//! Configuration module for the postrank service.
//!
//! This module contains the credential types for both authentication schemes
//! and the explicit configuration structs that are built from environment
//! variables (or any other lookup function) and passed into the client.

use log::{debug, info, warn};
use std::env;

use crate::error::{XApiError, XApiResult};

/// Default base URL of the X API v2.
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/2";
/// Default OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
/// Default OAuth 2.0 authorization page.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
/// Default Telegram Bot API base URL.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Weekly, Sunday 09:00.
pub const DEFAULT_DIGEST_SCHEDULE: &str = "0 0 9 * * Sun";

/// Masks a secret for logging, keeping at most 8 leading and 8 trailing characters.
pub(crate) fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let len = chars.len();
    let prefix: String = chars.iter().take(8.min(len)).collect();
    if len > 16 {
        let suffix: String = chars[len - 8..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else if len > 8 {
        format!("{}...", prefix)
    } else {
        "...".to_string()
    }
}

/// OAuth 2.0 user-context (delegated) credentials.
///
/// The access token is sent as a bearer token. Refreshing requires the client
/// id, the client secret and a refresh token; a value missing any of them
/// (for example an app-only bearer token) is used as-is and never refreshed.
#[derive(Clone, PartialEq, Eq)]
pub struct DelegatedCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl DelegatedCredentials {
    /// Credentials holding only a bearer token, without refresh capability.
    pub fn bearer_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            client_id: None,
            client_secret: None,
        }
    }

    /// Returns true when client id, client secret and refresh token are all present.
    pub fn can_refresh(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.refresh_token.is_some()
    }

    /// Returns a new value carrying a refreshed token pair and the same client.
    ///
    /// When the server did not rotate the refresh token, the current one is kept.
    pub fn with_tokens(&self, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

impl std::fmt::Debug for DelegatedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedCredentials")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// OAuth 1.0a (per-request signed) credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl std::fmt::Debug for SignedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCredentials")
            .field("consumer_key", &mask_token(&self.consumer_key))
            .field("consumer_secret", &"[REDACTED]")
            .field("token", &mask_token(&self.token))
            .field("token_secret", &"[REDACTED]")
            .finish()
    }
}

/// The credential set used for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Delegated(DelegatedCredentials),
    Signed(SignedCredentials),
}

impl Credentials {
    /// Human-readable scheme name for logging.
    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::Delegated(_) => "oauth2-bearer",
            Credentials::Signed(_) => "oauth1-signed",
        }
    }
}

/// Explicit configuration for the X API client.
#[derive(Debug, Clone)]
pub struct XApiConfig {
    /// Base URL of the X API v2, without trailing slash
    pub api_base: String,
    /// OAuth 2.0 token endpoint
    pub token_url: String,
    /// OAuth 2.0 authorization page (used by the setup flow)
    pub authorize_url: String,
    /// OAuth 2.0 user-context tokens
    pub delegated: Option<DelegatedCredentials>,
    /// Legacy app-only bearer token (read operations only)
    pub app_bearer: Option<String>,
    /// OAuth 1.0a credentials
    pub signed: Option<SignedCredentials>,
    /// OAuth 2.0 client id
    pub client_id: Option<String>,
    /// OAuth 2.0 client secret
    pub client_secret: Option<String>,
}

impl Default for XApiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            delegated: None,
            app_bearer: None,
            signed: None,
            client_id: None,
            client_secret: None,
        }
    }
}

/// Reads a trimmed, non-empty value through `lookup`.
fn read_var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl XApiConfig {
    /// Builds the configuration from process environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `X_OAUTH2_ACCESS_TOKEN`, `X_OAUTH2_REFRESH_TOKEN`: OAuth 2.0 user-context tokens
    /// - `X_CLIENT_ID` (or `X_CLIENT_SECRET_ID`), `X_CLIENT_SECRET`: OAuth 2.0 client
    /// - `X_BEARER_TOKEN`: legacy app-only bearer token
    /// - `X_API_KEY`, `X_API_SECRET`, `X_ACCESS_TOKEN`, `X_ACCESS_TOKEN_SECRET`: OAuth 1.0a
    /// - `X_API_BASE_URL`, `X_TOKEN_URL`, `X_AUTHORIZE_URL`: endpoint overrides
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// A scheme is only configured when all of its required values are present;
    /// values are trimmed and empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("Loading X API configuration");

        let api_base = read_var(&lookup, "X_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let token_url =
            read_var(&lookup, "X_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        let authorize_url = read_var(&lookup, "X_AUTHORIZE_URL")
            .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string());

        let client_id =
            read_var(&lookup, "X_CLIENT_ID").or_else(|| read_var(&lookup, "X_CLIENT_SECRET_ID"));
        let client_secret = read_var(&lookup, "X_CLIENT_SECRET");

        let delegated = read_var(&lookup, "X_OAUTH2_ACCESS_TOKEN").map(|access_token| {
            debug!("OAuth 2.0 access token (masked): {}", mask_token(&access_token));
            DelegatedCredentials {
                access_token,
                refresh_token: read_var(&lookup, "X_OAUTH2_REFRESH_TOKEN"),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }
        });

        if let Some(creds) = &delegated {
            if creds.can_refresh() {
                info!("Automatic token refresh is enabled");
            } else if creds.refresh_token.is_some() {
                warn!("Refresh token is provided but client credentials are missing - automatic token refresh will be disabled");
            } else {
                info!("No X_OAUTH2_REFRESH_TOKEN found - automatic token refresh will be disabled");
            }
        }

        // Tokens pasted from URLs sometimes arrive percent-encoded
        let app_bearer = read_var(&lookup, "X_BEARER_TOKEN").map(|token| {
            if token.contains('%') {
                match urlencoding::decode(&token) {
                    Ok(decoded) => decoded.into_owned(),
                    Err(e) => {
                        warn!("X_BEARER_TOKEN could not be percent-decoded, using as-is: {}", e);
                        token
                    }
                }
            } else {
                token
            }
        });

        let signed_parts = (
            read_var(&lookup, "X_API_KEY"),
            read_var(&lookup, "X_API_SECRET"),
            read_var(&lookup, "X_ACCESS_TOKEN"),
            read_var(&lookup, "X_ACCESS_TOKEN_SECRET"),
        );
        let signed = match signed_parts {
            (Some(consumer_key), Some(consumer_secret), Some(token), Some(token_secret)) => {
                Some(SignedCredentials {
                    consumer_key,
                    consumer_secret,
                    token,
                    token_secret,
                })
            }
            (None, None, None, None) => None,
            _ => {
                warn!("OAuth 1.0a credentials are incomplete - set X_API_KEY, X_API_SECRET, X_ACCESS_TOKEN and X_ACCESS_TOKEN_SECRET");
                None
            }
        };

        let config = XApiConfig {
            api_base,
            token_url,
            authorize_url,
            delegated,
            app_bearer,
            signed,
            client_id,
            client_secret,
        };

        info!(
            "X API configuration loaded (oauth2 user tokens: {}, app bearer: {}, oauth1: {})",
            config.delegated.is_some(),
            config.app_bearer.is_some(),
            config.signed.is_some()
        );
        config
    }

    /// Resolves the credentials for read operations.
    ///
    /// Precedence: OAuth 2.0 user tokens, then the legacy app-only bearer
    /// token, then OAuth 1.0a credentials.
    pub fn read_credentials(&self) -> XApiResult<Credentials> {
        if let Some(delegated) = &self.delegated {
            return Ok(Credentials::Delegated(delegated.clone()));
        }
        if let Some(bearer) = &self.app_bearer {
            return Ok(Credentials::Delegated(DelegatedCredentials::bearer_only(
                bearer.clone(),
            )));
        }
        if let Some(signed) = &self.signed {
            return Ok(Credentials::Signed(signed.clone()));
        }
        Err(XApiError::ConfigurationMissing(
            "no X API credentials configured; set X_OAUTH2_ACCESS_TOKEN, X_BEARER_TOKEN or X_API_KEY/X_API_SECRET/X_ACCESS_TOKEN/X_ACCESS_TOKEN_SECRET".to_string(),
        ))
    }

    /// Resolves the credentials for publishing.
    ///
    /// App-only bearer tokens cannot post, so only OAuth 2.0 user tokens
    /// (preferred) and OAuth 1.0a credentials are considered.
    pub fn write_credentials(&self) -> XApiResult<Credentials> {
        if let Some(delegated) = &self.delegated {
            return Ok(Credentials::Delegated(delegated.clone()));
        }
        if let Some(signed) = &self.signed {
            return Ok(Credentials::Signed(signed.clone()));
        }
        Err(XApiError::ConfigurationMissing(
            "no credentials for publishing; set X_OAUTH2_ACCESS_TOKEN or X_API_KEY/X_API_SECRET/X_ACCESS_TOKEN/X_ACCESS_TOKEN_SECRET".to_string(),
        ))
    }

    /// Returns the OAuth 2.0 client id and secret, required by the setup flow.
    pub fn client_credentials(&self) -> XApiResult<(String, String)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok((id.clone(), secret.clone())),
            _ => Err(XApiError::ConfigurationMissing(
                "set X_CLIENT_ID (or X_CLIENT_SECRET_ID) and X_CLIENT_SECRET".to_string(),
            )),
        }
    }
}

/// Settings for the best posts digest.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Handle whose posts are ranked
    pub username: String,
    /// Number of posts in the digest
    pub limit: usize,
    /// Scan the full history (up to the deep scan limit) before ranking
    pub fetch_all: bool,
    /// Cron expression for the scheduled digest
    pub schedule: String,
    /// Telegram bot token
    pub telegram_token: String,
    /// Telegram chat id the digest is sent to
    pub chat_id: String,
    /// Telegram Bot API base URL
    pub telegram_api_base: String,
}

impl DigestConfig {
    /// Builds the digest settings from process environment variables.
    pub fn from_env() -> XApiResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the digest settings from an arbitrary variable lookup.
    ///
    /// # Variables
    ///
    /// - `DIGEST_USERNAME` (required)
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_TARGET_CHAT_ID` (required)
    /// - `DIGEST_LIMIT` (default 10), `DIGEST_FETCH_ALL` (default false)
    /// - `DIGEST_SCHEDULE` (default weekly), `TELEGRAM_API_BASE_URL`
    pub fn from_lookup<F>(lookup: F) -> XApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = read_var(&lookup, "DIGEST_USERNAME").ok_or_else(|| {
            XApiError::ConfigurationMissing("DIGEST_USERNAME is not set".to_string())
        })?;
        let telegram_token = read_var(&lookup, "TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            XApiError::ConfigurationMissing("TELEGRAM_BOT_TOKEN is not set".to_string())
        })?;
        let chat_id = read_var(&lookup, "TELEGRAM_TARGET_CHAT_ID").ok_or_else(|| {
            XApiError::ConfigurationMissing("TELEGRAM_TARGET_CHAT_ID is not set".to_string())
        })?;

        let limit = match read_var(&lookup, "DIGEST_LIMIT") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!("Ignoring invalid DIGEST_LIMIT '{}', using 10", raw);
                    10
                }
            },
            None => 10,
        };
        let fetch_all = read_var(&lookup, "DIGEST_FETCH_ALL")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(DigestConfig {
            username,
            limit,
            fetch_all,
            schedule: read_var(&lookup, "DIGEST_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_DIGEST_SCHEDULE.to_string()),
            telegram_token,
            chat_id,
            telegram_api_base: read_var(&lookup, "TELEGRAM_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Gets the server port from the `PORT` environment variable, defaulting to 3000.
pub fn get_server_port() -> u16 {
    match env::var("PORT") {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("PORT '{}' is not a valid port number, using 3000", raw);
            3000
        }),
        Err(_) => 3000,
    }
}

/// Environment variable holding the bearer token `POST /posts` requires.
pub const API_TOKEN_ENV_VAR: &str = "POSTRANK_API_TOKEN";

/// Gets the token callers of `POST /posts` must present, if one is configured.
pub fn get_api_token() -> Option<String> {
    env::var(API_TOKEN_ENV_VAR)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const SIGNED_VARS: [(&str, &str); 4] = [
        ("X_API_KEY", "key"),
        ("X_API_SECRET", "secret"),
        ("X_ACCESS_TOKEN", "token"),
        ("X_ACCESS_TOKEN_SECRET", "token-secret"),
    ];

    #[test]
    fn test_no_credentials_is_configuration_missing() {
        let config = XApiConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(
            config.read_credentials(),
            Err(XApiError::ConfigurationMissing(_))
        ));
        assert!(matches!(
            config.write_credentials(),
            Err(XApiError::ConfigurationMissing(_))
        ));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_delegated_takes_precedence_over_signed() {
        let mut vars = SIGNED_VARS.to_vec();
        vars.push(("X_OAUTH2_ACCESS_TOKEN", "user-token"));
        let config = XApiConfig::from_lookup(lookup_from(&vars));

        match config.write_credentials().unwrap() {
            Credentials::Delegated(d) => assert_eq!(d.access_token, "user-token"),
            other => panic!("expected delegated credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_app_bearer_is_read_only() {
        let mut vars = SIGNED_VARS.to_vec();
        vars.push(("X_BEARER_TOKEN", "app%3Dtoken"));
        let config = XApiConfig::from_lookup(lookup_from(&vars));

        match config.read_credentials().unwrap() {
            Credentials::Delegated(d) => {
                assert_eq!(d.access_token, "app=token");
                assert!(!d.can_refresh());
            }
            other => panic!("expected bearer credentials, got {:?}", other),
        }
        assert!(matches!(
            config.write_credentials().unwrap(),
            Credentials::Signed(_)
        ));
    }

    #[test]
    fn test_incomplete_signed_credentials_are_ignored() {
        let config = XApiConfig::from_lookup(lookup_from(&[
            ("X_API_KEY", "key"),
            ("X_API_SECRET", "  "),
        ]));
        assert!(config.signed.is_none());
        assert!(config.read_credentials().is_err());
    }

    #[test]
    fn test_refresh_capability_requires_client() {
        let config = XApiConfig::from_lookup(lookup_from(&[
            ("X_OAUTH2_ACCESS_TOKEN", "a"),
            ("X_OAUTH2_REFRESH_TOKEN", "r"),
            ("X_CLIENT_SECRET_ID", "id"),
            ("X_CLIENT_SECRET", "secret"),
            ("X_API_BASE_URL", "http://localhost:9000/2/"),
        ]));
        let delegated = config.delegated.clone().unwrap();
        assert!(delegated.can_refresh());
        assert_eq!(delegated.client_id.as_deref(), Some("id"));
        assert_eq!(config.api_base, "http://localhost:9000/2");

        let refreshed = delegated.with_tokens("b".into(), None);
        assert_eq!(refreshed.refresh_token.as_deref(), Some("r"));
        assert_eq!(refreshed.access_token, "b");
    }

    #[test]
    fn test_digest_config_defaults_and_requirements() {
        assert!(DigestConfig::from_lookup(lookup_from(&[("DIGEST_USERNAME", "acme")])).is_err());

        let digest = DigestConfig::from_lookup(lookup_from(&[
            ("DIGEST_USERNAME", "acme"),
            ("TELEGRAM_BOT_TOKEN", "bot"),
            ("TELEGRAM_TARGET_CHAT_ID", "-100"),
            ("DIGEST_LIMIT", "zero"),
            ("DIGEST_FETCH_ALL", "true"),
        ]))
        .unwrap();
        assert_eq!(digest.limit, 10);
        assert!(digest.fetch_all);
        assert_eq!(digest.schedule, DEFAULT_DIGEST_SCHEDULE);
        assert_eq!(digest.telegram_api_base, DEFAULT_TELEGRAM_API_BASE);
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "...");
        assert_eq!(mask_token("0123456789ab"), "01234567...");
        assert_eq!(
            mask_token("0123456789abcdefghij"),
            "01234567...cdefghij"
        );
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let creds = SignedCredentials {
            consumer_key: "consumer-key-value".into(),
            consumer_secret: "very-secret".into(),
            token: "token".into(),
            token_secret: "also-secret".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("also-secret"));
    }
}
