use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::NarrativeGenerator;
use crate::config::{Config, ANTHROPIC_VERSION, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;
use crate::types::{
    ChainStats, MarketSnapshot, Sentiment, SignalBundle, SnapshotMap, TriggerReason,
};

/// Rotating angles so consecutive narratives do not read alike.
pub const FOCUS_AREAS: &[&str] = &[
    "Focus on volume patterns, smart money movements, and how the token is performing relative to the broader market.",
    "Emphasize technical indicators showing money flow in the market. Pay special attention to volume-to-price divergence.",
    "Analyze accumulation patterns and capital rotation. Look for subtle signs of institutional interest.",
    "Examine volume preceding price action. Note any leading indicators.",
    "Highlight the relationship between price action and significant volume changes.",
    "Investigate potential smart money positioning ahead of market moves. Note any anomalous volume signatures.",
    "Focus on recent volume clusters and their impact on price stability. Look for divergence patterns.",
    "Analyze volatility profile compared to the broader market and what this suggests about sentiment.",
];

const MAX_TOKENS: u32 = 1000;

/// Everything the generator is told about one asset.
#[derive(Debug, Clone)]
pub struct NarrativeContext {
    pub asset: String,
    pub trigger: TriggerReason,
    pub snapshot: MarketSnapshot,
    pub mood: Sentiment,
    pub signals: SignalBundle,
    pub chain_stats: Option<ChainStats>,
    /// Asset volume as a percentage of the rest of the basket's combined volume.
    pub market_volume_ratio: f64,
    pub callback: Option<String>,
    pub focus: &'static str,
}

impl NarrativeContext {
    pub fn new(
        snapshot: &MarketSnapshot,
        basket: &SnapshotMap,
        trigger: TriggerReason,
        signals: SignalBundle,
        chain_stats: Option<ChainStats>,
        callback: Option<String>,
        focus: &'static str,
    ) -> Self {
        let peer_volume: f64 = basket
            .values()
            .filter(|s| s.symbol != snapshot.symbol && s.volume_24h.is_finite())
            .map(|s| s.volume_24h)
            .sum();
        let market_volume_ratio = if peer_volume > 0.0 {
            snapshot.volume_24h / peer_volume * 100.0
        } else {
            0.0
        };
        Self {
            asset: snapshot.symbol.clone(),
            trigger,
            snapshot: snapshot.clone(),
            mood: Sentiment::of(snapshot),
            signals,
            chain_stats,
            market_volume_ratio,
            callback,
            focus,
        }
    }

    pub fn capital_rotation(&self) -> bool {
        let outperforming = self.signals.relative.as_ref().is_some_and(|r| r.outperforming);
        outperforming && self.signals.smart_money.volume_vs_daily_avg > 0.2
    }

    pub fn selling_pattern(&self) -> bool {
        let lagging_volume = self
            .signals
            .relative
            .as_ref()
            .is_some_and(|r| r.volume_growth_diff < 0.0);
        lagging_volume && self.signals.volume_trend.percent_change > 5.0
    }
}

pub fn build_prompt(ctx: &NarrativeContext) -> String {
    let token = &ctx.asset;
    let s = &ctx.snapshot;
    let sm = &ctx.signals.smart_money;
    let trend = &ctx.signals.volume_trend;

    let history = match &ctx.chain_stats {
        Some(st) => format!(
            "24h Avg: ${:.2}, High: ${:.2}, Low: ${:.2}",
            st.avg_price, st.max_price, st.min_price
        ),
        None => "No historical data".to_string(),
    };

    let mut p = String::new();
    let _ = writeln!(
        p,
        "Write a witty market analysis focusing on {token} token with attention to volume changes and smart money movements. Format as a single paragraph. Market data:\n"
    );
    let _ = writeln!(p, "{token} Performance:");
    let _ = writeln!(p, "- Price: ${:.4}", s.price);
    let _ = writeln!(p, "- 24h Change: {:.1}% ({})", s.price_change_24h_pct, ctx.mood);
    let _ = writeln!(p, "- Volume: ${:.0}\n", s.volume_24h);

    let _ = writeln!(p, "Historical Context:\n- {token}: {history}\n");

    let _ = writeln!(p, "Volume Analysis:");
    let _ = writeln!(p, "- Trend: {:.1}% vs recent average ({})", trend.percent_change, trend.trend);
    let _ = writeln!(p, "- vs hourly avg: {:.1}%", sm.volume_vs_hourly_avg * 100.0);
    let _ = writeln!(p, "- vs daily avg: {:.1}%", sm.volume_vs_daily_avg * 100.0);
    if ctx.trigger.is_volume_trend() {
        let direction = if trend.percent_change > 0.0 { "increase" } else { "decrease" };
        let _ = writeln!(
            p,
            "{token} showing {:.1}% {direction} in volume over the last hour. This is a {}.",
            trend.percent_change.abs(),
            trend.trend
        );
    }
    p.push('\n');

    let _ = writeln!(p, "Smart Money Indicators:");
    let _ = writeln!(p, "- Volume Z-score: {:.2}", sm.volume_z_score);
    let _ = writeln!(p, "- Price-Volume Divergence: {}", sm.price_volume_divergence);
    let _ = writeln!(p, "- Stealth Accumulation: {}", sm.stealth_accumulation);
    let _ = writeln!(p, "- Abnormal Volume: {}", sm.abnormal_volume);
    let _ = writeln!(p, "- Volume Clustering: {}", sm.volume_cluster_detected);
    if sm.abnormal_volume {
        let _ = writeln!(p, "Abnormal volume detected: {:.1} standard deviations from mean.", sm.volume_z_score);
    }
    if sm.stealth_accumulation {
        let _ = writeln!(p, "Potential stealth accumulation detected with minimal price movement and elevated volume.");
    }
    if sm.volume_cluster_detected {
        let _ = writeln!(p, "Volume clustering detected, suggesting possible institutional activity.");
    }
    if !sm.unusual_hours.is_empty() {
        let _ = writeln!(p, "Unusual trading hours detected: {}.", sm.unusual_hour_labels().join(", "));
    }
    p.push('\n');

    if let Some(rel) = &ctx.signals.relative {
        let _ = writeln!(p, "Market Comparison:");
        let _ = writeln!(p, "- vs Market avg change: {:.1}%", rel.performance_diff);
        let _ = writeln!(p, "- vs Market volume growth: {:.1}%", rel.volume_growth_diff);
        let _ = writeln!(p, "- Outperforming Market: {}", rel.outperforming);
        let verb = if rel.outperforming { "outperforming" } else { "underperforming" };
        let _ = writeln!(p, "{token} {verb} market average by {:.1}%\n", rel.performance_diff.abs());
    }

    if let Some(ath) = s.ath_change_pct {
        let _ = writeln!(p, "ATH Distance:\n- {token}: {ath:.1}%\n");
    }

    let yes_no = |b: bool| if b { "Yes" } else { "No" };
    let _ = writeln!(p, "Market Flow Analysis:");
    let _ = writeln!(p, "- {token}/Market volume ratio: {:.2}%", ctx.market_volume_ratio);
    let _ = writeln!(p, "- Potential capital rotation: {}", yes_no(ctx.capital_rotation()));
    let _ = writeln!(
        p,
        "- Market selling {token} buying patterns: {}",
        if ctx.selling_pattern() { "Detected" } else { "Not detected" }
    );
    if let Some(strength) = &ctx.signals.correlation_strength {
        let top: Vec<String> = strength
            .top_by_price(2)
            .iter()
            .map(|peer| format!("{}: {:.2}", peer.peer, peer.price_similarity))
            .collect();
        if !top.is_empty() {
            let _ = writeln!(p, "- Highest correlations: {}", top.join(", "));
        }
    }
    p.push('\n');

    let _ = writeln!(p, "Trigger Type: {}\n", ctx.trigger);
    let _ = writeln!(p, "Past Context: {}\n", ctx.callback.as_deref().unwrap_or("None"));
    let _ = write!(p, "Note: {} Keep the analysis fresh and varied. Avoid repetitive phrases.", ctx.focus);
    p
}

// ---------------------------------------------------------------------------
// Anthropic Messages API
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// First non-empty text block of a Messages API response.
fn extract_text(body: &str) -> Result<String> {
    let resp: MessagesResponse = serde_json::from_str(body)?;
    resp.content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
        .ok_or_else(|| AppError::Generation("response contained no text".to_string()))
}

pub struct AnthropicNarrator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl AnthropicNarrator {
    pub fn new(cfg: &Config) -> Result<Self> {
        if cfg.anthropic_api_key.is_empty() {
            return Err(AppError::Config("ANTHROPIC_API_KEY is required".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: cfg.anthropic_api_url.clone(),
            api_key: cfg.anthropic_api_key.clone(),
            model: cfg.anthropic_model.clone(),
            retry: RetryPolicy::default(),
        })
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [Message { role: "user", content: prompt }],
        };
        let resp = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AppError::Generation(format!("HTTP {status}: {text}")));
        }
        extract_text(&text)
    }
}

#[async_trait]
impl NarrativeGenerator for AnthropicNarrator {
    async fn generate(&self, ctx: &NarrativeContext) -> Result<String> {
        let prompt = build_prompt(ctx);
        debug!(asset = %ctx.asset, chars = prompt.len(), "requesting narrative");
        let text = self.retry.run("narrative generation", || self.request(&prompt)).await?;
        info!(asset = %ctx.asset, chars = text.len(), "[NARRATOR] narrative received");
        Ok(text)
    }
}
