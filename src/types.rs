use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    pub volume_24h: f64,
    pub price_change_24h_pct: f64,
    pub market_cap: Option<f64>,
    pub ath: Option<f64>,
    /// Distance from the all-time high, percent (negative below ATH).
    pub ath_change_pct: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// One polling cycle: symbol → snapshot. Ordered so basket iteration is stable.
pub type SnapshotMap = BTreeMap<String, MarketSnapshot>;

/// Current price per symbol, as consumed by prediction scoring.
pub fn price_map(snapshots: &SnapshotMap) -> BTreeMap<String, f64> {
    snapshots
        .iter()
        .map(|(symbol, s)| (symbol.clone(), s.price))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub timestamp: DateTime<Utc>,
    pub volume: f64,
}

// ---------------------------------------------------------------------------
// Volume trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    /// Empty historical window.
    InsufficientData,
    Stable,
    ModerateIncrease,
    ModerateDecrease,
    SignificantIncrease,
    SignificantDecrease,
    /// Degenerate baseline (zero or non-finite).
    Error,
}

impl VolumeTrend {
    pub fn is_significant(self) -> bool {
        matches!(self, VolumeTrend::SignificantIncrease | VolumeTrend::SignificantDecrease)
    }
}

impl std::fmt::Display for VolumeTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VolumeTrend::InsufficientData => "insufficient_data",
            VolumeTrend::Stable => "stable",
            VolumeTrend::ModerateIncrease => "moderate_increase",
            VolumeTrend::ModerateDecrease => "moderate_decrease",
            VolumeTrend::SignificantIncrease => "significant_increase",
            VolumeTrend::SignificantDecrease => "significant_decrease",
            VolumeTrend::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub percent_change: f64,
    pub trend: VolumeTrend,
}

impl TrendAnalysis {
    pub fn new(percent_change: f64, trend: VolumeTrend) -> Self {
        Self { percent_change, trend }
    }
}

// ---------------------------------------------------------------------------
// Smart money
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SmartMoneySignal {
    pub volume_z_score: f64,
    pub price_volume_divergence: bool,
    pub stealth_accumulation: bool,
    pub abnormal_volume: bool,
    /// Hours-ago buckets (1 = the most recent hour) holding an outsized share of volume.
    pub unusual_hours: Vec<u8>,
    pub volume_cluster_detected: bool,
    pub volume_vs_hourly_avg: f64,
    pub volume_vs_daily_avg: f64,
}

impl SmartMoneySignal {
    /// Signal used when inputs are unusable: nothing flagged, all ratios zero.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_actionable(&self) -> bool {
        self.abnormal_volume || self.stealth_accumulation
    }

    pub fn unusual_hour_labels(&self) -> Vec<String> {
        self.unusual_hours.iter().map(|h| format!("hour_{h}")).collect()
    }
}

// ---------------------------------------------------------------------------
// Relative comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerCorrelation {
    pub peer: String,
    /// Both 24h changes point the same way. Not a statistical correlation.
    pub correlated: bool,
    pub asset_change: f64,
    pub peer_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeComparison {
    pub asset: String,
    pub performance_diff: f64,
    pub volume_growth_diff: f64,
    pub correlations: Vec<PeerCorrelation>,
    pub outperforming: bool,
    pub basket_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerStrength {
    pub peer: String,
    pub price_similarity: f64,
    pub volume_similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStrength {
    pub asset: String,
    pub peers: Vec<PeerStrength>,
    pub avg_price_similarity: f64,
    pub avg_volume_similarity: f64,
}

impl CorrelationStrength {
    /// Peers ranked by price similarity, highest first.
    pub fn top_by_price(&self, n: usize) -> Vec<&PeerStrength> {
        let mut ranked: Vec<&PeerStrength> = self.peers.iter().collect();
        ranked.sort_by(|a, b| b.price_similarity.total_cmp(&a.price_similarity));
        ranked.truncate(n);
        ranked
    }
}

/// Quantitative context handed to narrative generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalBundle {
    pub volume_trend: TrendAnalysis,
    pub smart_money: SmartMoneySignal,
    pub relative: Option<RelativeComparison>,
    pub correlation_strength: Option<CorrelationStrength>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChainStats {
    pub avg_price: f64,
    pub max_price: f64,
    pub min_price: f64,
    pub samples: i64,
}

// ---------------------------------------------------------------------------
// Trigger decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// No baseline yet.
    InitialPost,
    PriceChange,
    VolumeChange,
    VolumeTrendIncrease,
    VolumeTrendDecrease,
    SmartMoney,
    OutperformingMarket,
    RegularInterval,
}

impl TriggerReason {
    pub fn is_volume_trend(self) -> bool {
        matches!(self, TriggerReason::VolumeTrendIncrease | TriggerReason::VolumeTrendDecrease)
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerReason::InitialPost => "initial_post",
            TriggerReason::PriceChange => "price_change",
            TriggerReason::VolumeChange => "volume_change",
            TriggerReason::VolumeTrendIncrease => "volume_trend_increase",
            TriggerReason::VolumeTrendDecrease => "volume_trend_decrease",
            TriggerReason::SmartMoney => "smart_money",
            TriggerReason::OutperformingMarket => "outperforming_market",
            TriggerReason::RegularInterval => "regular_interval",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerDecision {
    pub should_emit: bool,
    /// Set iff `should_emit`.
    pub reason: Option<TriggerReason>,
    pub evaluated_at: DateTime<Utc>,
}

impl TriggerDecision {
    pub fn emit(reason: TriggerReason, evaluated_at: DateTime<Utc>) -> Self {
        Self { should_emit: true, reason: Some(reason), evaluated_at }
    }

    pub fn skip(evaluated_at: DateTime<Utc>) -> Self {
        Self { should_emit: false, reason: None, evaluated_at }
    }
}

// ---------------------------------------------------------------------------
// Sentiment and predictions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
    Volatile,
    Recovering,
}

impl Sentiment {
    /// Directional weight used when scoring past calls.
    pub fn weight(self) -> f64 {
        match self {
            Sentiment::Bullish => 1.0,
            Sentiment::Bearish => -1.0,
            Sentiment::Neutral | Sentiment::Volatile => 0.0,
            Sentiment::Recovering => 0.5,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
            Sentiment::Volatile => "volatile",
            Sentiment::Recovering => "recovering",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionOutcome {
    Pending,
    Right,
    Wrong,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub created_at: DateTime<Utc>,
    pub asset: String,
    pub narrative: String,
    pub sentiment: BTreeMap<String, Sentiment>,
    pub prices: BTreeMap<String, f64>,
    pub outcome: PredictionOutcome,
}

// ---------------------------------------------------------------------------
// Posted content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostedContent {
    pub content: String,
    pub posted_at: DateTime<Utc>,
}

/// Everything persisted alongside a published narrative.
#[derive(Debug, Clone)]
pub struct PostRecord {
    pub content: String,
    pub asset: String,
    pub trigger: TriggerReason,
    pub sentiment: Sentiment,
    pub price: f64,
    pub volume: f64,
    pub posted_at: DateTime<Utc>,
}
