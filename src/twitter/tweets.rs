//! Publishing posts.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::api::{ApiRequest, XClient};
use super::posts::post_url;
use crate::error::{XApiError, XApiResult};

/// Longest post text accepted, in characters.
pub const MAX_POST_CHARS: usize = 280;

/// A post created by [`XClient::publish_post`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: String,
    pub text: String,
}

impl PublishedPost {
    pub fn url(&self) -> String {
        post_url(&self.id)
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    data: Option<PublishedPost>,
}

/// Trims `text` and cuts it to [`MAX_POST_CHARS`] characters.
///
/// Characters are Unicode scalar values, so multi-byte text is never split
/// inside a character.
pub fn truncate_post_text(text: &str) -> String {
    text.trim().chars().take(MAX_POST_CHARS).collect()
}

impl XClient {
    /// Publishes a text post.
    ///
    /// Empty text is rejected; longer text is truncated. Delegated user tokens
    /// are preferred over OAuth 1.0a credentials; app-only bearer tokens
    /// cannot publish.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use postrank::{XApiConfig, XClient};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = XClient::new(XApiConfig::from_env());
    ///     match client.publish_post("Hello from Rust!").await {
    ///         Ok(post) => println!("Posted: {}", post.url()),
    ///         Err(e) => eprintln!("Failed to publish: {}", e),
    ///     }
    /// }
    /// ```
    pub async fn publish_post(&self, text: &str) -> XApiResult<PublishedPost> {
        if text.trim().is_empty() {
            return Err(XApiError::InvalidInput("post text is empty".to_string()));
        }
        let original_chars = text.trim().chars().count();
        let text = truncate_post_text(text);
        if original_chars > MAX_POST_CHARS {
            warn!(
                "Post text was truncated from {} to {} characters",
                original_chars, MAX_POST_CHARS
            );
        }
        debug!("Post text byte length: {}", text.len());

        let mut session = self.write_session().await?;
        info!("Publishing post ({} characters)", text.chars().count());

        let request = ApiRequest::post_json("/tweets", json!({ "text": text }));
        let body = self
            .send_authorized(&mut session, &request, "publish_post")
            .await?;
        let response: PublishResponse = serde_json::from_str(&body)?;

        let post = response.data.ok_or_else(|| {
            XApiError::ProtocolViolation("publish response missing data".to_string())
        })?;
        info!("Post published: {}", post.url());
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_post_text() {
        assert_eq!(truncate_post_text("  hello  "), "hello");
        assert_eq!(truncate_post_text(&"a".repeat(300)).len(), 280);

        let emoji = "🦀".repeat(300);
        let truncated = truncate_post_text(&emoji);
        assert_eq!(truncated.chars().count(), 280);
        assert!(truncated.chars().all(|c| c == '🦀'));
    }

    #[test]
    fn test_published_post_url() {
        let post = PublishedPost {
            id: "99".into(),
            text: "x".into(),
        };
        assert_eq!(post.url(), "https://x.com/i/status/99");
    }
}
