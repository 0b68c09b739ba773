//! Collaborator interfaces the engine talks to.
//!
//! The detectors and the decision engine are pure over what these return;
//! concrete implementations live in `db`, `fetcher`, `narrator` and `publisher`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::narrator::NarrativeContext;
use crate::types::{
    ChainStats, CorrelationStrength, MarketSnapshot, PostRecord, PostedContent,
    RelativeComparison, Sentiment, SmartMoneySignal, SnapshotMap, VolumePoint,
};

/// Time-series of observed 24h volumes per asset.
#[async_trait]
pub trait HistoricalVolumeStore: Send + Sync {
    /// Points within `[now - window_minutes, now]`, oldest first.
    async fn volume_window(
        &self,
        asset: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<VolumePoint>>;
}

/// Read side of published content, used by duplicate suppression.
#[async_trait]
pub trait PostedContentSource: Send + Sync {
    /// Posts with `from <= posted_at <= to`.
    async fn posts_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PostedContent>>;
}

/// Best-effort writes. Callers log failures and carry on.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn save_market_data(&self, snapshot: &MarketSnapshot) -> Result<()>;

    async fn save_smart_money(
        &self,
        asset: &str,
        signal: &SmartMoneySignal,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn save_comparison(&self, comparison: &RelativeComparison, at: DateTime<Utc>)
        -> Result<()>;

    async fn save_correlations(&self, strength: &CorrelationStrength, at: DateTime<Utc>)
        -> Result<()>;

    async fn save_posted_content(&self, post: &PostRecord) -> Result<()>;

    async fn save_mood(
        &self,
        asset: &str,
        mood: Sentiment,
        snapshot: &MarketSnapshot,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// 24h price statistics, None when nothing has been recorded yet.
    async fn chain_stats(&self, asset: &str, hours: i64, now: DateTime<Utc>)
        -> Result<Option<ChainStats>>;
}

/// Fetches the whole basket at once; fails wholesale, never per asset.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<SnapshotMap>;
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, context: &NarrativeContext) -> Result<String>;
}

#[async_trait]
pub trait PublishingChannel: Send + Sync {
    /// Ok(false) means the channel refused the post after its retries.
    async fn publish(&self, text: &str) -> Result<bool>;

    /// Most recent posts as seen by the channel itself.
    async fn recent_posts(&self) -> Result<Vec<String>>;
}
