//! Database module for storing and retrieving delegated tokens.
//!
//! Every refresh appends a row to `delegated_tokens`; the newest row is the
//! current pair. Token values are encrypted with [`TokenCipher`] before they
//! reach the database.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sqlx::{PgPool, Row};

use crate::config::mask_token;
use crate::crypto::TokenCipher;
use crate::error::XApiResult;
use crate::tokens::StoredTokens;

/// Establishes a connection pool to the PostgreSQL database.
pub async fn get_db_pool(database_url: &str) -> XApiResult<PgPool> {
    info!("Connecting to PostgreSQL database");
    debug!(
        "Database URL (masked): {}...",
        database_url.chars().take(20).collect::<String>()
    );

    let pool = PgPool::connect(database_url).await?;
    info!("Successfully connected to PostgreSQL database");

    Ok(pool)
}

/// Creates the `delegated_tokens` table if it does not exist.
pub async fn create_tokens_table(pool: &PgPool) -> XApiResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS delegated_tokens (
            id BIGSERIAL PRIMARY KEY,
            access_token TEXT NOT NULL,
            refresh_token TEXT,
            expires_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("delegated_tokens table is ready");
    Ok(())
}

/// Retrieves and decrypts the most recent token pair.
///
/// # Returns
///
/// - `Ok(Some(StoredTokens))`: The latest pair
/// - `Ok(None)`: If no tokens have been stored yet
/// - `Err`: If the query or the decryption fails
pub async fn get_latest_tokens(
    pool: &PgPool,
    cipher: &TokenCipher,
) -> XApiResult<Option<StoredTokens>> {
    debug!("Querying database for latest delegated tokens");

    let row = sqlx::query(
        r#"
        SELECT access_token, refresh_token, expires_at, created_at
        FROM delegated_tokens
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        warn!("No delegated tokens found in database");
        return Ok(None);
    };

    let access_token = cipher.decrypt(row.get::<String, _>("access_token").as_str())?;
    let refresh_token = match row.get::<Option<String>, _>("refresh_token") {
        Some(encrypted) => Some(cipher.decrypt(&encrypted)?),
        None => None,
    };
    let expires_at: Option<DateTime<Utc>> = row.get("expires_at");
    let created_at: DateTime<Utc> = row.get("created_at");

    info!(
        "Found delegated tokens created at {} (access token masked: {})",
        created_at,
        mask_token(&access_token)
    );

    Ok(Some(StoredTokens {
        access_token,
        refresh_token,
        expires_at,
    }))
}

/// Encrypts and stores a new token pair.
///
/// Older rows stay in the table for history; only the newest is read back.
pub async fn save_tokens(pool: &PgPool, cipher: &TokenCipher, tokens: &StoredTokens) -> XApiResult<()> {
    info!("Storing new delegated tokens in database");
    debug!(
        "Access token (masked): {}",
        mask_token(&tokens.access_token)
    );

    let access_token = cipher.encrypt(&tokens.access_token)?;
    let refresh_token = match &tokens.refresh_token {
        Some(token) => Some(cipher.encrypt(token)?),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO delegated_tokens (access_token, refresh_token, expires_at, created_at)
        VALUES ($1, $2, $3, NOW())
        "#,
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(tokens.expires_at)
    .execute(pool)
    .await?;

    info!("Successfully stored delegated tokens in database");
    Ok(())
}
