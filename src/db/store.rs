use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;

use crate::backend::{HistoricalVolumeStore, PersistenceStore, PostedContentSource};
use crate::config::duplicates::PERSISTED_SIMILARITY_THRESHOLD;
use crate::db::models::{ChainStatsRow, PostedContentRow, VolumeRow};
use crate::db::{from_ns, to_ns};
use crate::error::Result;
use crate::filter::{normalize, word_overlap};
use crate::types::{
    ChainStats, CorrelationStrength, MarketSnapshot, PostRecord, PostedContent,
    RelativeComparison, Sentiment, SmartMoneySignal, VolumePoint,
};

/// SQLite-backed store. Serves as the volume history, the posted-content
/// source and the persistence sink.
#[derive(Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    /// Whether anything posted in the last `hours` shares more than 70% of its
    /// words with `content`. Looser than the live duplicate filter.
    pub async fn has_similar_post(&self, content: &str, hours: i64, now: DateTime<Utc>) -> Result<bool> {
        let since = to_ns(now - Duration::hours(hours));
        let posts: Vec<String> =
            sqlx::query_scalar("SELECT content FROM posted_content WHERE posted_at >= ?")
                .bind(since)
                .fetch_all(&self.pool)
                .await?;

        let candidate = normalize(content);
        Ok(posts
            .iter()
            .any(|post| word_overlap(&candidate, &normalize(post)) > PERSISTED_SIMILARITY_THRESHOLD))
    }
}

#[async_trait]
impl HistoricalVolumeStore for SqliteStore {
    async fn volume_window(
        &self,
        asset: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<VolumePoint>> {
        let since = to_ns(now - Duration::minutes(window_minutes));
        let rows = sqlx::query_as::<_, VolumeRow>(
            r#"
            SELECT recorded_at, volume_24h
            FROM market_data
            WHERE symbol = ? AND recorded_at >= ? AND recorded_at <= ?
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(asset)
        .bind(since)
        .bind(to_ns(now))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| VolumePoint { timestamp: from_ns(r.recorded_at), volume: r.volume_24h })
            .collect())
    }
}

#[async_trait]
impl PostedContentSource for SqliteStore {
    async fn posts_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PostedContent>> {
        let rows = sqlx::query_as::<_, PostedContentRow>(
            r#"
            SELECT id, content, asset, trigger_type, sentiment, price_data, posted_at
            FROM posted_content
            WHERE posted_at >= ? AND posted_at <= ?
            ORDER BY posted_at DESC
            "#,
        )
        .bind(to_ns(from))
        .bind(to_ns(to))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PostedContent { content: r.content, posted_at: from_ns(r.posted_at) })
            .collect())
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn save_market_data(&self, s: &MarketSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market_data (
                symbol, price, volume_24h, price_change_24h,
                market_cap, ath, ath_change_pct, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&s.symbol)
        .bind(s.price)
        .bind(s.volume_24h)
        .bind(s.price_change_24h_pct)
        .bind(s.market_cap)
        .bind(s.ath)
        .bind(s.ath_change_pct)
        .bind(to_ns(s.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_smart_money(
        &self,
        asset: &str,
        signal: &SmartMoneySignal,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let unusual_hours = serde_json::to_string(&signal.unusual_hours)?;
        sqlx::query(
            r#"
            INSERT INTO smart_money_indicators (
                symbol, volume_z_score, price_volume_divergence, stealth_accumulation,
                abnormal_volume, volume_vs_hourly_avg, volume_vs_daily_avg,
                volume_cluster_detected, unusual_hours, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset)
        .bind(signal.volume_z_score)
        .bind(signal.price_volume_divergence)
        .bind(signal.stealth_accumulation)
        .bind(signal.abnormal_volume)
        .bind(signal.volume_vs_hourly_avg)
        .bind(signal.volume_vs_daily_avg)
        .bind(signal.volume_cluster_detected)
        .bind(unusual_hours)
        .bind(to_ns(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_comparison(&self, c: &RelativeComparison, at: DateTime<Utc>) -> Result<()> {
        let correlations = serde_json::to_string(&c.correlations)?;
        sqlx::query(
            r#"
            INSERT INTO token_market_comparison (
                symbol, performance_diff, volume_growth_diff, outperforming,
                basket_size, correlations, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&c.asset)
        .bind(c.performance_diff)
        .bind(c.volume_growth_diff)
        .bind(c.outperforming)
        .bind(c.basket_size as i64)
        .bind(correlations)
        .bind(to_ns(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_correlations(&self, s: &CorrelationStrength, at: DateTime<Utc>) -> Result<()> {
        let peers = serde_json::to_string(&s.peers)?;
        sqlx::query(
            r#"
            INSERT INTO token_correlations (
                symbol, avg_price_similarity, avg_volume_similarity, peers, recorded_at
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&s.asset)
        .bind(s.avg_price_similarity)
        .bind(s.avg_volume_similarity)
        .bind(peers)
        .bind(to_ns(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_posted_content(&self, post: &PostRecord) -> Result<()> {
        let sentiment: BTreeMap<&str, Sentiment> = [(post.asset.as_str(), post.sentiment)].into();
        let mut price_data = serde_json::Map::new();
        price_data.insert(post.asset.clone(), json!({ "price": post.price, "volume": post.volume }));
        sqlx::query(
            r#"
            INSERT INTO posted_content (
                content, asset, trigger_type, sentiment, price_data, posted_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.content)
        .bind(&post.asset)
        .bind(post.trigger.to_string())
        .bind(serde_json::to_string(&sentiment)?)
        .bind(serde_json::Value::Object(price_data).to_string())
        .bind(to_ns(post.posted_at))
        .execute(&self.pool)
        .await?;
        debug!(asset = %post.asset, trigger = %post.trigger, "posted content stored");
        Ok(())
    }

    async fn save_mood(
        &self,
        asset: &str,
        mood: Sentiment,
        snapshot: &MarketSnapshot,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mood_history (symbol, mood, price_change_24h, ath_change_pct, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset)
        .bind(mood.to_string())
        .bind(snapshot.price_change_24h_pct)
        .bind(snapshot.ath_change_pct)
        .bind(to_ns(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn chain_stats(
        &self,
        asset: &str,
        hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ChainStats>> {
        let row = sqlx::query_as::<_, ChainStatsRow>(
            r#"
            SELECT AVG(price) AS avg_price, MAX(price) AS max_price,
                   MIN(price) AS min_price, COUNT(*) AS samples
            FROM market_data
            WHERE symbol = ? AND recorded_at >= ?
            "#,
        )
        .bind(asset)
        .bind(to_ns(now - Duration::hours(hours)))
        .fetch_one(&self.pool)
        .await?;

        Ok(match (row.avg_price, row.max_price, row.min_price) {
            (Some(avg_price), Some(max_price), Some(min_price)) if row.samples > 0 => Some(ChainStats {
                avg_price,
                max_price,
                min_price,
                samples: row.samples,
            }),
            _ => None,
        })
    }
}
