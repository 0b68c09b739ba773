/// Row types for the tables in migrations/0001_init.sql.
/// Timestamps are Unix nanoseconds; JSON columns are kept as raw text.

#[derive(Debug, sqlx::FromRow)]
pub struct VolumeRow {
    pub recorded_at: i64,
    pub volume_24h: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ChainStatsRow {
    pub avg_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_price: Option<f64>,
    pub samples: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PostedContentRow {
    pub id: i64,
    pub content: String,
    pub asset: String,
    pub trigger_type: String,
    pub sentiment: String,
    pub price_data: String,
    pub posted_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SmartMoneyRow {
    pub id: i64,
    pub symbol: String,
    pub volume_z_score: f64,
    pub price_volume_divergence: bool,
    pub stealth_accumulation: bool,
    pub abnormal_volume: bool,
    pub volume_vs_hourly_avg: f64,
    pub volume_vs_daily_avg: f64,
    pub volume_cluster_detected: bool,
    pub unusual_hours: String,
    pub recorded_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ComparisonRow {
    pub id: i64,
    pub symbol: String,
    pub performance_diff: f64,
    pub volume_growth_diff: f64,
    pub outperforming: bool,
    pub basket_size: i64,
    pub correlations: String,
    pub recorded_at: i64,
}
