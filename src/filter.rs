use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::backend::PostedContentSource;
use crate::config::duplicates::{
    EXACT_WINDOW_MINUTES, HASHTAG_SEPARATOR, HIGH_SIMILARITY_THRESHOLD, SIMILARITY_WINDOW_MINUTES,
};

/// Body text without its trailing hashtag block, trimmed and lower-cased.
pub fn normalize(text: &str) -> String {
    let body = match text.find(HASHTAG_SEPARATOR) {
        Some(idx) => &text[..idx],
        None => text,
    };
    body.trim().to_lowercase()
}

/// |A ∩ B| / max(|A|, |B|) over distinct whitespace-separated words.
/// Expects normalized input. Zero when either side has no words.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count();
    shared as f64 / words_a.len().max(words_b.len()) as f64
}

/// Rejects candidates that repeat what was just published.
///
/// Strictness depends on age: exact matches only within 15 minutes, high word
/// overlap within 30, anything older passes.
pub struct DuplicateFilter {
    posts: Arc<dyn PostedContentSource>,
}

impl DuplicateFilter {
    pub fn new(posts: Arc<dyn PostedContentSource>) -> Self {
        Self { posts }
    }

    /// Storage errors fail open: the candidate is treated as new.
    pub async fn is_duplicate(&self, candidate: &str, fallback_recent: &[String], now: DateTime<Utc>) -> bool {
        let normalized = normalize(candidate);

        let since = now - Duration::minutes(SIMILARITY_WINDOW_MINUTES);
        let recent = match self.posts.posts_between(since, now).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!("duplicate check skipped, storage error: {e}");
                return false;
            }
        };

        let exact_window = Duration::minutes(EXACT_WINDOW_MINUTES);
        for post in &recent {
            let age = now - post.posted_at;
            let previous = normalize(&post.content);
            if age <= exact_window {
                if previous == normalized {
                    info!(age_secs = age.num_seconds(), "[DUPLICATE] exact match of a very recent post");
                    return true;
                }
            } else {
                let similarity = word_overlap(&normalized, &previous);
                if similarity > HIGH_SIMILARITY_THRESHOLD {
                    info!(
                        age_secs = age.num_seconds(),
                        similarity,
                        "[DUPLICATE] near-duplicate of a recent post"
                    );
                    return true;
                }
            }
        }

        if fallback_recent.iter().any(|p| normalize(p) == normalized) {
            info!("[DUPLICATE] exact match against the channel's recent posts");
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::MemoryPosts;
    use crate::types::PostedContent;

    const BASE: &str = "btc volume surges while price holds steady near resistance";

    fn posted(content: &str, minutes_ago: i64, now: DateTime<Utc>) -> PostedContent {
        PostedContent { content: content.to_string(), posted_at: now - Duration::minutes(minutes_ago) }
    }

    fn filter_with(posts: Vec<PostedContent>) -> DuplicateFilter {
        DuplicateFilter::new(Arc::new(MemoryPosts::with(posts)))
    }

    #[test]
    fn normalization_drops_hashtags_and_case() {
        assert_eq!(normalize("  BTC Pumps!\n\n#crypto #btc"), "btc pumps!");
        assert_eq!(normalize("no tags here "), "no tags here");
    }

    #[test]
    fn overlap_uses_the_larger_word_set() {
        assert!((word_overlap("a b c d", "a b") - 0.5).abs() < 1e-9);
        assert_eq!(word_overlap("", "a b"), 0.0);
        assert_eq!(word_overlap("a a b", "a b"), 1.0);
    }

    #[tokio::test]
    async fn identical_text_five_minutes_ago_is_duplicate() {
        let now = Utc::now();
        let filter = filter_with(vec![posted(&format!("{BASE}\n\n#BTC"), 5, now)]);
        assert!(filter.is_duplicate(&BASE.to_uppercase(), &[], now).await);
    }

    #[tokio::test]
    async fn high_overlap_twenty_minutes_ago_is_duplicate() {
        let now = Utc::now();
        // 8 of 9 words shared → 0.89
        let earlier = "btc volume surges while price holds steady near support";
        let filter = filter_with(vec![posted(earlier, 20, now)]);
        assert!(filter.is_duplicate(BASE, &[], now).await);
    }

    #[tokio::test]
    async fn half_overlap_twenty_minutes_ago_passes() {
        let now = Utc::now();
        let earlier = "btc volume surges while price dumps on weak eth news";
        assert_eq!(word_overlap(BASE, earlier), 0.5);
        let filter = filter_with(vec![posted(earlier, 20, now)]);
        assert!(!filter.is_duplicate(BASE, &[], now).await);
    }

    #[tokio::test]
    async fn near_duplicate_within_fifteen_minutes_passes() {
        let now = Utc::now();
        let earlier = "btc volume surges while price holds steady near support";
        let filter = filter_with(vec![posted(earlier, 10, now)]);
        assert!(!filter.is_duplicate(BASE, &[], now).await);
    }

    #[tokio::test]
    async fn fifteen_minutes_exactly_is_still_exact_only() {
        let now = Utc::now();
        let near = "btc volume surges while price holds steady near support";

        let filter = filter_with(vec![posted(BASE, 15, now)]);
        assert!(filter.is_duplicate(BASE, &[], now).await);

        let filter = filter_with(vec![posted(near, 15, now)]);
        assert!(!filter.is_duplicate(BASE, &[], now).await);
    }

    #[tokio::test]
    async fn thirty_minutes_exactly_is_still_checked() {
        let now = Utc::now();
        let near = "btc volume surges while price holds steady near support";
        let filter = filter_with(vec![posted(near, 30, now)]);
        assert!(filter.is_duplicate(BASE, &[], now).await);
    }

    #[tokio::test]
    async fn anything_older_than_thirty_minutes_passes() {
        let now = Utc::now();
        let filter = filter_with(vec![posted(BASE, 45, now)]);
        assert!(!filter.is_duplicate(BASE, &[], now).await);
    }

    #[tokio::test]
    async fn fallback_list_catches_stale_storage() {
        let now = Utc::now();
        let filter = filter_with(Vec::new());
        let fallback = vec![format!("{BASE}\n\n#crypto"), "something else".to_string()];
        assert!(filter.is_duplicate(BASE, &fallback, now).await);
        assert!(!filter.is_duplicate("fresh take", &fallback, now).await);
    }

    #[tokio::test]
    async fn storage_errors_fail_open() {
        let now = Utc::now();
        let posts = MemoryPosts { fail: true, ..MemoryPosts::with(vec![posted(BASE, 1, now)]) };
        let filter = DuplicateFilter::new(Arc::new(posts));
        assert!(!filter.is_duplicate(BASE, &[], now).await);
    }
}
