//! X API integration module.
//!
//! This module contains the client and the operations built on it: author
//! lookup, paginated post listing, the top posts pipeline and publishing.
//! Requests are authorized with OAuth 2.0 bearer tokens or OAuth 1.0a
//! signatures depending on the configured credentials.

mod api;
mod posts;
mod tweets;
mod users;

pub use api::XClient;
pub use posts::{
    page_cap, post_url, AuthorPosts, Post, PostMetrics, TopPosts, TopPostsRequest,
    DEEP_SCAN_LIMIT, MAX_PAGE_SIZE, MAX_TOP_POSTS, MIN_PAGE_SIZE,
};
pub use tweets::{truncate_post_text, PublishedPost, MAX_POST_CHARS};
pub use users::{normalize_handle, Author};

pub(crate) use api::sanitize_for_logging;
