//! Post listing and the top posts pipeline.
//!
//! [`XClient::fetch_posts`] walks `GET /users/{id}/tweets` with the cursor
//! returned in `meta.next_token`. Each page asks for the number of items
//! still needed, clamped to what the endpoint accepts, and the walk stops as
//! soon as enough items are collected or the cursor runs out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::api::{ApiRequest, XClient};
use super::users::{normalize_handle, Author};
use crate::error::{XApiError, XApiResult};
use crate::ranking::{rank_posts, EngagementWeights, ScoredPost};
use crate::tokens::AuthSession;

/// Largest page the listing endpoint returns.
pub const MAX_PAGE_SIZE: usize = 100;
/// Smallest `max_results` the listing endpoint accepts.
pub const MIN_PAGE_SIZE: usize = 5;
/// Upper bound for a full-history scan.
pub const DEEP_SCAN_LIMIT: usize = 3200;
/// Page cap for a listing of `max_items`: every page must carry at least
/// [`MIN_PAGE_SIZE`] new posts on average, otherwise the server is looping.
pub fn page_cap(max_items: usize) -> usize {
    max_items.div_ceil(MIN_PAGE_SIZE).max(1)
}
/// Most posts a top posts request may return.
pub const MAX_TOP_POSTS: usize = 100;

const POST_FIELDS: &str = "created_at,public_metrics";
const EXCLUDE: &str = "retweets,replies";

/// Public counters of a post. Missing counters are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetrics {
    #[serde(rename = "like_count", default)]
    pub likes: u64,
    #[serde(rename = "retweet_count", default)]
    pub reshares: u64,
    #[serde(rename = "reply_count", default)]
    pub replies: u64,
    #[serde(rename = "quote_count", default)]
    pub quotes: u64,
    #[serde(rename = "bookmark_count", default)]
    pub bookmarks: u64,
    #[serde(rename = "impression_count", default)]
    pub impressions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "public_metrics", default)]
    pub metrics: Option<PostMetrics>,
}

/// Public URL of a post.
pub fn post_url(id: &str) -> String {
    format!("https://x.com/i/status/{}", id)
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostPage {
    #[serde(default)]
    data: Vec<Post>,
    #[serde(default)]
    meta: PageMeta,
}

/// An author together with their fetched posts.
#[derive(Debug, Clone)]
pub struct AuthorPosts {
    pub author: Author,
    pub posts: Vec<Post>,
}

/// Parameters of a top posts request.
#[derive(Debug, Clone)]
pub struct TopPostsRequest {
    pub handle: String,
    /// Number of posts to return, clamped to 1..=100
    pub limit: usize,
    /// Scan up to [`DEEP_SCAN_LIMIT`] posts instead of `limit * 2`
    pub fetch_all: bool,
    /// When false, posts are returned in listing order
    pub sort_by_engagement: bool,
}

impl TopPostsRequest {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            limit: 10,
            fetch_all: false,
            sort_by_engagement: true,
        }
    }

    /// Number of posts to fetch before ranking.
    pub fn fetch_count(&self) -> usize {
        if self.fetch_all {
            DEEP_SCAN_LIMIT
        } else {
            self.clamped_limit() * 2
        }
    }

    fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, MAX_TOP_POSTS)
    }
}

/// Result of a top posts request.
#[derive(Debug, Clone)]
pub struct TopPosts {
    pub author: Author,
    /// How many posts were fetched before ranking
    pub fetched: usize,
    pub posts: Vec<ScoredPost>,
}

impl XClient {
    /// Fetches up to `max_items` of an author's original posts, newest first.
    pub async fn fetch_posts(&self, author_id: &str, max_items: usize) -> XApiResult<Vec<Post>> {
        let mut session = self.read_session().await?;
        self.fetch_posts_with(&mut session, author_id, max_items)
            .await
    }

    pub(crate) async fn fetch_posts_with(
        &self,
        session: &mut AuthSession,
        author_id: &str,
        max_items: usize,
    ) -> XApiResult<Vec<Post>> {
        info!(
            "Fetching up to {} posts for user {}",
            max_items, author_id
        );

        let mut posts: Vec<Post> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut used_cursors: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut page_count: usize = 0;
        let max_pages = page_cap(max_items);

        while posts.len() < max_items {
            let page_size = (max_items - posts.len()).clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
            let mut request = ApiRequest::get(format!("/users/{}/tweets", author_id))
                .query("max_results", page_size.to_string())
                .query("tweet.fields", POST_FIELDS)
                .query("exclude", EXCLUDE);
            if let Some(token) = &cursor {
                request = request.query("pagination_token", token.clone());
            }

            let body = self
                .send_authorized(session, &request, "fetch_posts")
                .await?;
            let page: PostPage = serde_json::from_str(&body)?;
            page_count += 1;
            debug!(
                "Page {} returned {} posts",
                page_count,
                page.data.len()
            );

            for post in page.data {
                if posts.len() >= max_items {
                    break;
                }
                if seen_ids.insert(post.id.clone()) {
                    posts.push(post);
                } else {
                    debug!("Dropping duplicate post {}", post.id);
                }
            }

            if posts.len() >= max_items {
                break;
            }

            let next = match page.meta.next_token.filter(|t| !t.is_empty()) {
                Some(next) => next,
                None => break,
            };
            if !used_cursors.insert(next.clone()) {
                return Err(XApiError::ProtocolViolation(format!(
                    "pagination cursor '{}' was returned twice",
                    next
                )));
            }
            if page_count >= max_pages {
                warn!(
                    "Reached max page limit ({}) with a cursor still pending. Fetched {} posts so far.",
                    max_pages,
                    posts.len()
                );
                return Err(XApiError::ProtocolViolation(format!(
                    "listing still paginating after {} pages with {} of {} posts",
                    max_pages,
                    posts.len(),
                    max_items
                )));
            }
            cursor = Some(next);
        }

        info!(
            "Fetched {} posts for user {} ({} pages)",
            posts.len(),
            author_id,
            page_count
        );
        Ok(posts)
    }

    /// Resolves `handle` and fetches up to `max_items` of its posts.
    ///
    /// `Ok(None)` means the account does not exist, which is different from
    /// an account with no posts.
    pub async fn fetch_author_posts(
        &self,
        handle: &str,
        max_items: usize,
    ) -> XApiResult<Option<AuthorPosts>> {
        let handle = normalize_handle(handle)?;
        let mut session = self.read_session().await?;

        let Some(author) = self.lookup_author_with(&mut session, &handle).await? else {
            return Ok(None);
        };
        let posts = self
            .fetch_posts_with(&mut session, &author.id, max_items)
            .await?;
        Ok(Some(AuthorPosts { author, posts }))
    }

    /// Fetches an author's posts and returns the best ones by engagement.
    pub async fn top_posts(&self, request: &TopPostsRequest) -> XApiResult<TopPosts> {
        let limit = request.clamped_limit();
        let fetch_count = request.fetch_count();
        info!(
            "Fetching top {} posts for @{} (scanning up to {})",
            limit, request.handle, fetch_count
        );

        let AuthorPosts { author, posts } = self
            .fetch_author_posts(&request.handle, fetch_count)
            .await?
            .ok_or_else(|| {
                XApiError::ResolutionFailed(request.handle.trim().trim_start_matches('@').to_string())
            })?;

        let fetched = posts.len();
        let weights = EngagementWeights::default();
        let posts = if request.sort_by_engagement {
            rank_posts(posts, &weights, limit)
        } else {
            posts
                .into_iter()
                .take(limit)
                .map(|post| ScoredPost::new(post, &weights))
                .collect()
        };

        info!(
            "Selected {} of {} fetched posts for @{}",
            posts.len(),
            fetched,
            author.handle
        );
        Ok(TopPosts {
            author,
            fetched,
            posts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_wire_format() {
        let post: Post = serde_json::from_str(
            r#"{"id":"1","text":"hi","created_at":"2024-05-01T12:00:00.000Z","public_metrics":{"like_count":3,"retweet_count":1}}"#,
        )
        .unwrap();
        let metrics = post.metrics.unwrap();
        assert_eq!(metrics.likes, 3);
        assert_eq!(metrics.reshares, 1);
        assert_eq!(metrics.impressions, 0);
        assert!(post.created_at.is_some());

        let bare: Post = serde_json::from_str(r#"{"id":"2","text":"x"}"#).unwrap();
        assert!(bare.metrics.is_none());
    }

    #[test]
    fn test_page_without_data_or_meta() {
        let page: PostPage = serde_json::from_str(r#"{"meta":{"result_count":0}}"#).unwrap();
        assert!(page.data.is_empty());
        assert!(page.meta.next_token.is_none());
    }

    #[test]
    fn test_fetch_count() {
        let mut request = TopPostsRequest::new("acme");
        assert_eq!(request.fetch_count(), 20);
        request.limit = 0;
        assert_eq!(request.fetch_count(), 2);
        request.limit = 500;
        assert_eq!(request.fetch_count(), 200);
        request.fetch_all = true;
        assert_eq!(request.fetch_count(), DEEP_SCAN_LIMIT);
    }

    #[test]
    fn test_page_cap() {
        assert_eq!(page_cap(0), 1);
        assert_eq!(page_cap(2), 1);
        assert_eq!(page_cap(20), 4);
        assert_eq!(page_cap(DEEP_SCAN_LIMIT), 640);
    }

    #[test]
    fn test_post_url() {
        assert_eq!(post_url("123"), "https://x.com/i/status/123");
    }
}
