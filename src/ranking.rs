//! Engagement ranking.
//!
//! Scores are a weighted sum of a post's public counters. Ranking is a stable
//! descending sort, so posts with equal scores keep their input order.

use serde::Serialize;

use crate::twitter::{Post, PostMetrics};

/// Per-counter weights for the engagement score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementWeights {
    pub like: f64,
    pub reshare: f64,
    pub reply: f64,
    pub quote: f64,
    pub bookmark: f64,
    pub impression: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            like: 1.0,
            reshare: 2.0,
            reply: 1.5,
            quote: 2.0,
            bookmark: 3.0,
            impression: 0.01,
        }
    }
}

impl EngagementWeights {
    /// Scores a set of counters. Absent metrics score as all zero.
    pub fn score(&self, metrics: Option<&PostMetrics>) -> f64 {
        let Some(m) = metrics else {
            return 0.0;
        };
        m.likes as f64 * self.like
            + m.reshares as f64 * self.reshare
            + m.replies as f64 * self.reply
            + m.quotes as f64 * self.quote
            + m.bookmarks as f64 * self.bookmark
            + m.impressions as f64 * self.impression
    }
}

/// A post paired with its engagement score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPost {
    #[serde(flatten)]
    pub post: Post,
    pub score: f64,
}

impl ScoredPost {
    pub fn new(post: Post, weights: &EngagementWeights) -> Self {
        let score = weights.score(post.metrics.as_ref());
        Self { post, score }
    }
}

/// Scores `posts`, sorts them by descending score and keeps the first `top_k`.
pub fn rank_posts(posts: Vec<Post>, weights: &EngagementWeights, top_k: usize) -> Vec<ScoredPost> {
    let mut scored: Vec<ScoredPost> = posts
        .into_iter()
        .map(|post| ScoredPost::new(post, weights))
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, likes: u64, reshares: u64) -> Post {
        Post {
            id: id.to_string(),
            text: format!("post {}", id),
            created_at: None,
            metrics: Some(PostMetrics {
                likes,
                reshares,
                ..PostMetrics::default()
            }),
        }
    }

    fn ids(ranked: &[ScoredPost]) -> Vec<&str> {
        ranked.iter().map(|s| s.post.id.as_str()).collect()
    }

    #[test]
    fn test_zero_and_absent_metrics_score_zero() {
        let weights = EngagementWeights::default();
        assert_eq!(weights.score(Some(&PostMetrics::default())), 0.0);
        assert_eq!(weights.score(None), 0.0);
    }

    #[test]
    fn test_weighted_sum() {
        let weights = EngagementWeights::default();
        let metrics = PostMetrics {
            likes: 10,
            reshares: 5,
            replies: 2,
            quotes: 1,
            bookmarks: 1,
            impressions: 1000,
        };
        // 10 + 10 + 3 + 2 + 3 + 10
        assert!((weights.score(Some(&metrics)) - 38.0).abs() < 1e-9);
    }

    #[test]
    fn test_reshare_outweighs_like() {
        let ranked = rank_posts(
            vec![post("likes", 3, 0), post("reshares", 0, 2)],
            &EngagementWeights::default(),
            10,
        );
        assert_eq!(ids(&ranked), vec!["reshares", "likes"]);
    }

    #[test]
    fn test_ranking_is_stable_for_equal_scores() {
        let posts = vec![
            post("a", 1, 0),
            post("b", 0, 0),
            post("c", 1, 0),
            post("d", 5, 0),
            post("e", 1, 0),
        ];
        let ranked = rank_posts(posts, &EngagementWeights::default(), 10);
        assert_eq!(ids(&ranked), vec!["d", "a", "c", "e", "b"]);
    }

    #[test]
    fn test_truncates_to_top_k() {
        let posts = (0..20).map(|i| post(&i.to_string(), i, 0)).collect();
        let ranked = rank_posts(posts, &EngagementWeights::default(), 3);
        assert_eq!(ids(&ranked), vec!["19", "18", "17"]);
        assert!(rank_posts(Vec::new(), &EngagementWeights::default(), 3).is_empty());
    }
}
