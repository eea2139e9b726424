//! # Postrank Library
//!
//! An X (Twitter) API v2 client that ranks a user's posts by engagement and
//! publishes posts. Requests are authorized with OAuth 2.0 bearer tokens,
//! refreshed transparently once per operation when they expire, or signed
//! per request with OAuth 1.0a HMAC-SHA1.
//!
//! ## Features
//!
//! - Cursor pagination over a user's posts with a bounded deep scan
//! - Stable engagement ranking
//! - Publishing with delegated or signed credentials
//! - One-time PKCE authorization with a loopback callback listener
//! - Encrypted token storage in PostgreSQL
//! - Best posts digest delivered to Telegram, on demand or on a schedule
//! - HTTP service (`/health`, `/posts/top`, `/posts`)
//!
//! ## Configuration
//!
//! See [`XApiConfig::from_env`] and [`DigestConfig::from_env`]. Secrets are
//! only ever logged masked.

pub mod config;
pub mod cronjob;
pub mod crypto;
pub mod db;
pub mod digest;
pub mod error;
pub mod handlers;
pub mod oauth;
pub mod ranking;
pub mod setup;
pub mod tokens;
pub mod twitter;

// Re-export commonly used types and functions
pub use config::{
    get_api_token, get_server_port, Credentials, DelegatedCredentials, DigestConfig,
    SignedCredentials, XApiConfig,
};
pub use cronjob::start_digest_cronjob;
pub use crypto::TokenCipher;
pub use digest::{run_digest, DigestSink};
pub use error::{XApiError, XApiResult};
pub use ranking::{rank_posts, EngagementWeights, ScoredPost};
pub use tokens::{TokenManager, TokenStore};
pub use twitter::{Author, Post, PostMetrics, PublishedPost, TopPosts, TopPostsRequest, XClient};
