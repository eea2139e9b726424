//! OAuth 2.0 token lifecycle.
//!
//! This module owns everything that touches the token endpoint: exchanging a
//! refresh token for a new access token, the per-operation [`AuthSession`]
//! snapshot, the refresh-once-then-retry wrapper used by every authenticated
//! API call, and the store that keeps rotated tokens across operations.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::config::{mask_token, Credentials, DelegatedCredentials};
use crate::crypto::TokenCipher;
use crate::db;
use crate::error::{XApiError, XApiResult};
use crate::oauth::build_basic_auth_header;
use crate::twitter::sanitize_for_logging;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: u64 = 7200;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Tokens issued by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Posts a form to the token endpoint with HTTP Basic client authentication.
///
/// Non-2xx responses, transport failures and unparseable bodies are
/// [`XApiError::RefreshFailed`]; a 2xx body without `access_token` is a
/// [`XApiError::ProtocolViolation`].
pub(crate) async fn request_token(
    http: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    form: &[(&str, &str)],
) -> XApiResult<TokenGrant> {
    let body = serde_urlencoded::to_string(form)
        .map_err(|e| XApiError::RefreshFailed(format!("could not encode token request: {}", e)))?;

    let response = http
        .post(token_url)
        .header("Authorization", build_basic_auth_header(client_id, client_secret))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|e| XApiError::RefreshFailed(format!("token endpoint unreachable: {}", e)))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| XApiError::RefreshFailed(format!("token endpoint body unreadable: {}", e)))?;

    if !status.is_success() {
        error!("Token endpoint returned {}", status);
        debug!("Token endpoint error body: {}", sanitize_for_logging(&text, 200));
        return Err(XApiError::RefreshFailed(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            sanitize_for_logging(&text, 200)
        )));
    }

    let parsed: TokenResponse = serde_json::from_str(&text)
        .map_err(|e| XApiError::RefreshFailed(format!("malformed token response: {}", e)))?;

    let access_token = parsed
        .access_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            XApiError::ProtocolViolation("token endpoint response missing access_token".to_string())
        })?;

    Ok(TokenGrant {
        access_token,
        refresh_token: parsed
            .refresh_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        expires_in: parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
    })
}

/// Exchanges a refresh token for a new access token.
///
/// When the server does not rotate the refresh token, the grant carries the
/// one that was sent.
pub async fn refresh_grant(
    http: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> XApiResult<TokenGrant> {
    info!("Requesting new access token from token endpoint");
    let mut grant = request_token(
        http,
        token_url,
        client_id,
        client_secret,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ],
    )
    .await?;

    if grant.refresh_token.is_some() {
        info!("Token endpoint rotated the refresh token");
    } else {
        grant.refresh_token = Some(refresh_token.to_string());
    }
    Ok(grant)
}

/// Where an operation's token stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// The access token is believed valid.
    Fresh,
    /// A refresh is in flight.
    Refreshing,
    /// The refresh was rejected or the refreshed token was rejected too.
    Failed,
}

/// Credential snapshot owned by a single operation.
#[derive(Debug, Clone)]
pub struct AuthSession {
    credentials: Credentials,
    state: TokenState,
    refresh_attempted: bool,
}

impl AuthSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: TokenState::Fresh,
            refresh_attempted: false,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn refresh_attempted(&self) -> bool {
        self.refresh_attempted
    }
}

/// A token pair as kept in a [`TokenStore`].
#[derive(Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredTokens {
    pub fn from_grant(grant: &TokenGrant) -> Self {
        Self {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            expires_at: Some(Utc::now() + Duration::seconds(grant.expires_in as i64)),
        }
    }
}

impl std::fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTokens")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

type MemorySlot = std::sync::Mutex<Option<StoredTokens>>;

fn lock_slot(slot: &MemorySlot) -> XApiResult<std::sync::MutexGuard<'_, Option<StoredTokens>>> {
    slot.lock()
        .map_err(|_| XApiError::Store("token store lock poisoned".to_string()))
}

/// Storage for the most recent delegated token pair.
#[derive(Debug)]
pub enum TokenStore {
    /// Process-local storage, lost on restart.
    Memory(MemorySlot),
    /// PostgreSQL storage with tokens encrypted at rest.
    Postgres { pool: PgPool, cipher: TokenCipher },
}

impl TokenStore {
    pub fn memory() -> Self {
        TokenStore::Memory(std::sync::Mutex::new(None))
    }

    /// Connects to PostgreSQL and makes sure the token table exists.
    pub async fn postgres(database_url: &str, cipher: TokenCipher) -> XApiResult<Self> {
        let pool = db::get_db_pool(database_url).await?;
        db::create_tokens_table(&pool).await?;
        Ok(TokenStore::Postgres { pool, cipher })
    }

    /// Picks the store from `DATABASE_URL`: PostgreSQL when set, memory otherwise.
    pub async fn from_env() -> XApiResult<Self> {
        Self::from_database_url(std::env::var("DATABASE_URL").ok().as_deref()).await
    }

    /// Connects to `database_url` (with the key from `TOKEN_ENCRYPTION_KEY`),
    /// falling back to memory when it is absent or blank.
    pub async fn from_database_url(database_url: Option<&str>) -> XApiResult<Self> {
        match database_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => {
                let cipher = TokenCipher::from_env()?;
                let store = Self::postgres(url, cipher).await?;
                info!("Refreshed tokens will be stored in PostgreSQL");
                Ok(store)
            }
            None => {
                warn!("DATABASE_URL is not set - refreshed tokens are kept in memory only");
                Ok(Self::memory())
            }
        }
    }

    /// Whether saved tokens outlive the process.
    pub fn is_persistent(&self) -> bool {
        matches!(self, TokenStore::Postgres { .. })
    }

    /// Returns the latest stored pair, if any.
    pub async fn load(&self) -> XApiResult<Option<StoredTokens>> {
        match self {
            TokenStore::Memory(slot) => Ok(lock_slot(slot)?.clone()),
            TokenStore::Postgres { pool, cipher } => db::get_latest_tokens(pool, cipher).await,
        }
    }

    /// Records `tokens` as the latest pair.
    pub async fn save(&self, tokens: &StoredTokens) -> XApiResult<()> {
        match self {
            TokenStore::Memory(slot) => {
                *lock_slot(slot)? = Some(tokens.clone());
                Ok(())
            }
            TokenStore::Postgres { pool, cipher } => db::save_tokens(pool, cipher, tokens).await,
        }
    }
}

/// Refreshes delegated tokens and keeps the latest pair in a [`TokenStore`].
///
/// Refreshes are serialized: X invalidates a refresh token after its first
/// use, so two operations must never spend the same one concurrently.
#[derive(Debug)]
pub struct TokenManager {
    http: Client,
    token_url: String,
    store: TokenStore,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(http: Client, token_url: impl Into<String>, store: TokenStore) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Returns the pair a refresh left in a memory-only store.
    ///
    /// Those tokens die with the process, and the refresh token the process
    /// started with has already been spent, so callers should hand them to
    /// the user. Persistent stores return `None`.
    pub async fn rotated_tokens(&self) -> XApiResult<Option<StoredTokens>> {
        if self.store.is_persistent() {
            return Ok(None);
        }
        self.store.load().await
    }

    /// Builds an operation's credential snapshot.
    ///
    /// Refreshable delegated credentials pick up the latest stored pair, so a
    /// rotation made by an earlier operation is not lost. A stored pair always
    /// wins over the configured one: after re-authorizing, the new pair has to
    /// be written to the store (the authorize script does this when
    /// `DATABASE_URL` is set), otherwise the stale stored pair keeps being used.
    pub async fn snapshot(&self, configured: Credentials) -> AuthSession {
        let credentials = match configured {
            Credentials::Delegated(delegated) if delegated.can_refresh() => {
                match self.store.load().await {
                    Ok(Some(stored)) => {
                        debug!(
                            "Using stored access token (masked): {}",
                            mask_token(&stored.access_token)
                        );
                        Credentials::Delegated(
                            delegated.with_tokens(stored.access_token, stored.refresh_token),
                        )
                    }
                    Ok(None) => Credentials::Delegated(delegated),
                    Err(e) => {
                        warn!("Failed to load stored tokens, using configured ones: {}", e);
                        Credentials::Delegated(delegated)
                    }
                }
            }
            other => other,
        };
        AuthSession::new(credentials)
    }

    /// Returns credentials carrying a new access token.
    ///
    /// If another operation already replaced the token `current` holds, the
    /// stored pair is adopted without calling the token endpoint.
    pub async fn refresh(
        &self,
        current: &DelegatedCredentials,
    ) -> XApiResult<DelegatedCredentials> {
        let (client_id, client_secret, refresh_token) = match (
            current.client_id.as_deref(),
            current.client_secret.as_deref(),
            current.refresh_token.as_deref(),
        ) {
            (Some(id), Some(secret), Some(token)) => (id, secret, token),
            _ => {
                return Err(XApiError::RefreshFailed(
                    "missing client id, client secret or refresh token".to_string(),
                ))
            }
        };

        let _guard = self.refresh_lock.lock().await;

        match self.store.load().await {
            Ok(Some(stored)) if stored.access_token != current.access_token => {
                info!("Access token was already refreshed by another operation, adopting it");
                return Ok(current.with_tokens(stored.access_token, stored.refresh_token));
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to check token store before refresh: {}", e),
        }

        let grant = refresh_grant(
            &self.http,
            &self.token_url,
            client_id,
            client_secret,
            refresh_token,
        )
        .await?;

        if let Err(e) = self.store.save(&StoredTokens::from_grant(&grant)).await {
            warn!("Failed to persist refreshed tokens: {}", e);
            warn!("Refreshed tokens are held in memory only for this operation");
        }

        info!(
            "Access token refreshed (masked): {}",
            mask_token(&grant.access_token)
        );
        Ok(current.with_tokens(grant.access_token, grant.refresh_token))
    }

    /// Runs `attempt` with the session's credentials, refreshing once on 401/403.
    ///
    /// - Errors other than [`XApiError::AuthExpired`] propagate untouched.
    /// - Signed credentials, bearer-only credentials and sessions that already
    ///   refreshed once return the authorization error as-is.
    /// - Otherwise the token is refreshed and `attempt` runs exactly once more.
    pub async fn with_refresh<T, F, Fut>(
        &self,
        session: &mut AuthSession,
        operation: &str,
        mut attempt: F,
    ) -> XApiResult<T>
    where
        F: FnMut(Credentials) -> Fut,
        Fut: Future<Output = XApiResult<T>>,
    {
        let auth_error = match attempt(session.credentials.clone()).await {
            Err(e) if e.is_auth_expired() => e,
            other => return other,
        };

        let delegated = match &session.credentials {
            Credentials::Delegated(delegated) => delegated.clone(),
            Credentials::Signed(_) => {
                error!(
                    "Signed request for operation '{}' was rejected - check OAuth 1.0a credentials",
                    operation
                );
                return Err(auth_error);
            }
        };

        if session.refresh_attempted {
            error!(
                "Authorization rejected again for operation '{}' - token already refreshed once",
                operation
            );
            session.state = TokenState::Failed;
            return Err(auth_error);
        }

        if !delegated.can_refresh() {
            error!(
                "Cannot refresh token for operation '{}' - missing refresh credentials",
                operation
            );
            return Err(auth_error);
        }

        warn!(
            "Authorization rejected for operation '{}' - access token may be expired, refreshing",
            operation
        );
        session.refresh_attempted = true;
        session.state = TokenState::Refreshing;

        match self.refresh(&delegated).await {
            Ok(refreshed) => {
                session.credentials = Credentials::Delegated(refreshed);
                session.state = TokenState::Fresh;
            }
            Err(e) => {
                error!("Token refresh failed for operation '{}': {}", operation, e);
                session.state = TokenState::Failed;
                return Err(e);
            }
        }

        info!("Retrying operation '{}' with refreshed token", operation);
        let retried = attempt(session.credentials.clone()).await;
        if matches!(&retried, Err(e) if e.is_auth_expired()) {
            error!(
                "Operation '{}' still unauthorized after token refresh",
                operation
            );
            session.state = TokenState::Failed;
        }
        retried
    }
}
