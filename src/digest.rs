//! Best posts digest.
//!
//! Ranks an author's posts and delivers them as one HTML message, either to a
//! Telegram chat through the Bot API or to the log.

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::{mask_token, DigestConfig};
use crate::error::{XApiError, XApiResult};
use crate::ranking::ScoredPost;
use crate::twitter::{post_url, sanitize_for_logging, TopPostsRequest, XClient};

/// Characters of post text shown per entry.
pub const PREVIEW_CHARS: usize = 200;
/// Telegram's limit for one message.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_entry(rank: usize, scored: &ScoredPost) -> String {
    let metrics = scored.post.metrics.clone().unwrap_or_default();
    // Blank lines separate entries, so none may survive inside a preview
    let flattened = scored
        .post
        .text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview: String = flattened.chars().take(PREVIEW_CHARS).collect();
    let ellipsis = if flattened.chars().count() > PREVIEW_CHARS {
        "…"
    } else {
        ""
    };
    format!(
        "{}. <a href=\"{}\">{}{}</a>\n   ❤️ {} · 🔁 {} · 💬 {} (score: {})",
        rank,
        post_url(&scored.post.id),
        escape_html(&preview),
        ellipsis,
        metrics.likes,
        metrics.reshares,
        metrics.replies,
        scored.score.round() as i64
    )
}

/// Formats ranked posts as a Telegram HTML message.
pub fn format_digest(handle: &str, ranked: &[ScoredPost]) -> String {
    let mut sections = Vec::with_capacity(ranked.len() + 1);
    sections.push(format!(
        "🐦 <b>Top {} posts from @{}</b> (by engagement)\n",
        ranked.len(),
        escape_html(handle)
    ));
    sections.extend(
        ranked
            .iter()
            .enumerate()
            .map(|(i, scored)| format_entry(i + 1, scored)),
    );
    sections.join("\n\n")
}

/// Splits a digest into messages of at most `limit` characters, on entry boundaries.
///
/// A single entry longer than `limit` is sent on its own.
pub fn split_message(message: &str, limit: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for section in message.split("\n\n") {
        let needed = if current.is_empty() {
            section.chars().count()
        } else {
            current.chars().count() + 2 + section.chars().count()
        };
        if needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(section);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API delivery.
#[derive(Clone)]
pub struct TelegramSink {
    http: Client,
    api_base: String,
    bot_token: String,
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink")
            .field("api_base", &self.api_base)
            .field("bot_token", &mask_token(&self.bot_token))
            .finish()
    }
}

impl TelegramSink {
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        }
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> XApiResult<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<TelegramResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(TelegramResponse { ok: true, .. }) if status.is_success() => Ok(()),
            other => {
                let reason = other
                    .and_then(|r| r.description)
                    .unwrap_or_else(|| sanitize_for_logging(&body, 200));
                Err(XApiError::Http {
                    operation: "telegram_send_message".to_string(),
                    status: status.as_u16(),
                    body: reason,
                })
            }
        }
    }
}

/// Where a digest goes.
#[derive(Debug, Clone)]
pub enum DigestSink {
    Telegram(TelegramSink),
    /// Writes the digest to the log; for dry runs.
    Log,
}

impl DigestSink {
    /// Builds the Telegram sink from the digest settings.
    pub fn telegram(config: &DigestConfig) -> Self {
        DigestSink::Telegram(TelegramSink::new(
            config.telegram_api_base.clone(),
            config.telegram_token.clone(),
        ))
    }

    /// Delivers `message` to `destination` (a chat id for Telegram).
    pub async fn deliver(&self, destination: &str, message: &str) -> XApiResult<()> {
        match self {
            DigestSink::Telegram(sink) => {
                let chunks = split_message(message, TELEGRAM_MESSAGE_LIMIT);
                info!(
                    "Sending digest to Telegram chat {} ({} message(s))",
                    destination,
                    chunks.len()
                );
                for chunk in &chunks {
                    sink.send_message(destination, chunk).await?;
                }
                Ok(())
            }
            DigestSink::Log => {
                info!("Digest for {}:\n{}", destination, message);
                Ok(())
            }
        }
    }
}

/// Ranks the configured author's posts and delivers the digest.
///
/// Returns the number of posts in the digest. Nothing is delivered when the
/// author has no posts.
pub async fn run_digest(
    client: &XClient,
    config: &DigestConfig,
    sink: &DigestSink,
) -> XApiResult<usize> {
    let mut request = TopPostsRequest::new(config.username.clone());
    request.limit = config.limit;
    request.fetch_all = config.fetch_all;

    info!("Building best posts digest for @{}", config.username);
    let top = client.top_posts(&request).await?;

    if top.posts.is_empty() {
        warn!("No posts found for @{}, digest not sent", top.author.handle);
        return Ok(0);
    }

    let message = format_digest(&top.author.handle, &top.posts);
    debug!("Digest message length: {} characters", message.chars().count());
    sink.deliver(&config.chat_id, &message).await?;

    info!(
        "Digest with {} posts for @{} delivered",
        top.posts.len(),
        top.author.handle
    );
    Ok(top.posts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twitter::{Post, PostMetrics};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scored(id: &str, text: &str, likes: u64, score: f64) -> ScoredPost {
        ScoredPost {
            post: Post {
                id: id.to_string(),
                text: text.to_string(),
                created_at: None,
                metrics: Some(PostMetrics {
                    likes,
                    reshares: 2,
                    replies: 1,
                    ..PostMetrics::default()
                }),
            },
            score,
        }
    }

    #[test]
    fn test_format_digest() {
        let message = format_digest(
            "acme",
            &[scored("1", "Hello <world> & co", 5, 10.4), scored("2", "Second", 1, 6.5)],
        );
        assert_eq!(
            message,
            "🐦 <b>Top 2 posts from @acme</b> (by engagement)\n\n\n\
             1. <a href=\"https://x.com/i/status/1\">Hello &lt;world&gt; &amp; co</a>\n   ❤️ 5 · 🔁 2 · 💬 1 (score: 10)\n\n\
             2. <a href=\"https://x.com/i/status/2\">Second</a>\n   ❤️ 1 · 🔁 2 · 💬 1 (score: 7)"
        );
    }

    #[test]
    fn test_long_text_is_cut_with_ellipsis() {
        let long = "é".repeat(250);
        let message = format_digest("acme", &[scored("1", &long, 0, 0.0)]);
        assert!(message.contains(&format!("{}…</a>", "é".repeat(200))));
        assert!(!message.contains(&"é".repeat(201)));
    }

    #[test]
    fn test_split_message() {
        let message = ["aaaa", "bbbb", "cccc"].join("\n\n");
        assert_eq!(split_message(&message, 100), vec![message.clone()]);
        assert_eq!(split_message(&message, 10), vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(split_message(&message, 3), vec!["aaaa", "bbbb", "cccc"]);
    }

    #[test]
    fn test_multiline_posts_split_on_entry_boundaries() {
        let text = "first paragraph\n\nsecond paragraph\r\n\r\nthird ".repeat(8);
        let ranked: Vec<ScoredPost> = (0..40)
            .map(|i| scored(&i.to_string(), &text, i, i as f64))
            .collect();
        let message = format_digest("acme", &ranked);
        assert!(message.contains("first paragraph second paragraph third"));

        let chunks = split_message(&message, TELEGRAM_MESSAGE_LIMIT);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
            assert_eq!(chunk.matches("<a ").count(), chunk.matches("</a>").count());
        }
        assert_eq!(chunks.iter().map(|c| c.matches("</a>").count()).sum::<usize>(), 40);
    }

    #[tokio::test]
    async fn test_telegram_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "-100",
                "text": "hello",
                "parse_mode": "HTML"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let sink = DigestSink::Telegram(TelegramSink::new(server.uri(), "TOKEN"));
        sink.deliver("-100", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_telegram_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let sink = DigestSink::Telegram(TelegramSink::new(server.uri(), "TOKEN"));
        let err = sink.deliver("-100", "hello").await.unwrap_err();
        assert_eq!(err.kind(), "http_error");
        assert!(err.to_string().contains("chat not found"));
    }

    #[test]
    fn test_sink_debug_masks_token() {
        let sink = TelegramSink::new("https://api.telegram.org", "123456789:ABCDEFGHIJKLMNOP");
        assert!(!format!("{:?}", sink).contains("ABCDEFGHIJKLMNOP"));
    }
}
