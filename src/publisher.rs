use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::PublishingChannel;
use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;

/// Posts a channel remembers for the duplicate filter's fallback check.
const RECENT_POSTS_KEPT: usize = 10;

/// Last few published texts, newest first.
#[derive(Default)]
struct RecentPosts {
    posts: Mutex<VecDeque<String>>,
}

impl RecentPosts {
    fn push(&self, text: &str) {
        if let Ok(mut posts) = self.posts.lock() {
            posts.push_front(text.to_string());
            posts.truncate(RECENT_POSTS_KEPT);
        }
    }

    fn snapshot(&self) -> Result<Vec<String>> {
        self.posts
            .lock()
            .map(|posts| posts.iter().cloned().collect())
            .map_err(|_| AppError::Publish("recent posts lock poisoned".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Webhook channel
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// POSTs each narrative as `{"text": ...}` to a configured URL.
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
    recent: RecentPosts,
}

impl WebhookPublisher {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            retry: RetryPolicy::default(),
            recent: RecentPosts::default(),
        })
    }

    async fn post_once(&self, text: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookPayload { text })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl PublishingChannel for WebhookPublisher {
    async fn publish(&self, text: &str) -> Result<bool> {
        match self.retry.run("webhook publish", || self.post_once(text)).await {
            Ok(()) => {
                self.recent.push(text);
                info!(chars = text.len(), "[PUBLISH] narrative delivered to webhook");
                Ok(true)
            }
            Err(e) => {
                warn!("[PUBLISH] webhook refused narrative after retries: {e}");
                Ok(false)
            }
        }
    }

    async fn recent_posts(&self) -> Result<Vec<String>> {
        self.recent.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Dry-run channel
// ---------------------------------------------------------------------------

/// Logs narratives instead of sending them. Used when no webhook is configured.
#[derive(Default)]
pub struct LogPublisher {
    recent: RecentPosts,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublishingChannel for LogPublisher {
    async fn publish(&self, text: &str) -> Result<bool> {
        info!("[PUBLISH] (dry run) {text}");
        self.recent.push(text);
        Ok(true)
    }

    async fn recent_posts(&self) -> Result<Vec<String>> {
        self.recent.snapshot()
    }
}
