use std::time::Duration;

use crate::error::{AppError, Result};

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default basket: (symbol, CoinGecko id).
pub const DEFAULT_TRACKED_ASSETS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("BNB", "binancecoin"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("UNI", "uniswap"),
    ("NEAR", "near"),
    ("AAVE", "aave"),
    ("FIL", "filecoin"),
    ("POL", "matic-network"),
    ("KAITO", "kaito"),
];

/// Attempts per external call (fetch, generate, publish).
pub const MAX_RETRIES: u32 = 3;

/// Linear backoff between attempts: attempt × this many seconds.
pub const RETRY_BACKOFF_SECS: u64 = 10;

/// HTTP timeout for collaborator requests.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Sleep after a cycle that failed outright.
pub const ERROR_BACKOFF_SECS: u64 = 60;

/// Trailing windows used by the detectors.
pub mod windows {
    pub const HOURLY_MINUTES: i64 = 60;
    pub const DAILY_MINUTES: i64 = 1440;
    /// Price history summarised in the narrative's historical context.
    pub const CHAIN_STATS_HOURS: i64 = 24;
}

/// Volume trend classification.
pub mod trend_thresholds {
    /// Default "significant" band, overridable via VOLUME_TREND_THRESHOLD.
    pub const SIGNIFICANT_PCT: f64 = 15.0;
    pub const MODERATE_PCT: f64 = 5.0;
}

/// Smart money heuristics.
pub mod smart_money {
    pub const ZSCORE_THRESHOLD: f64 = 2.0;
    /// Stealth accumulation: volume above daily average × this...
    pub const STEALTH_VOLUME_MULTIPLIER: f64 = 1.5;
    /// ...while the absolute 24h price change stays under this.
    pub const STEALTH_MAX_PRICE_CHANGE_PCT: f64 = 2.0;
    pub const CLUSTER_VOLUME_MULTIPLIER: f64 = 1.3;
    pub const CLUSTER_LENGTH: usize = 3;
    /// Share of the profile total (percent) that flags an hour as unusual.
    pub const UNUSUAL_HOUR_SHARE_PCT: f64 = 15.0;
    pub const PROFILE_HOURS: usize = 24;
}

/// Trigger priority thresholds that are not configurable at runtime.
pub mod trigger {
    /// |performance_diff| above which outperformance triggers an update.
    pub const OUTPERFORMANCE_PCT: f64 = 5.0;
}

/// Prediction buffer retention and scoring.
pub mod predictions {
    pub const MAX_RECORDS: usize = 20;
    pub const RETENTION_HOURS: i64 = 24;
    /// weight × percent move below this marks a call as wrong.
    pub const WRONG_SCORE: f64 = -2.0;
}

/// Duplicate suppression windows and thresholds.
pub mod duplicates {
    pub const EXACT_WINDOW_MINUTES: i64 = 15;
    pub const SIMILARITY_WINDOW_MINUTES: i64 = 30;
    /// Live filter threshold for the 15–30 minute bucket.
    pub const HIGH_SIMILARITY_THRESHOLD: f64 = 0.85;
    /// Threshold used by the persistence-layer similarity helper.
    pub const PERSISTED_SIMILARITY_THRESHOLD: f64 = 0.70;
    /// Marker that starts the trailing hashtag block.
    pub const HASHTAG_SEPARATOR: &str = "\n\n#";
}

/// Mood classification bands.
pub mod mood {
    pub const VOLATILITY_MAX: f64 = 0.15;
    pub const STRONG_MOVE_PCT: f64 = 5.0;
    pub const RECOVERY_MIN_PCT: f64 = 2.0;
    pub const RECOVERY_ATH_DISTANCE_PCT: f64 = -30.0;
}

/// Runtime-tunable trigger thresholds.
#[derive(Debug, Clone)]
pub struct TriggerThresholds {
    pub price_change_pct: f64,
    pub volume_change_pct: f64,
    pub volume_trend_pct: f64,
    pub volume_window_minutes: i64,
    pub base_interval: Duration,
}

impl Default for TriggerThresholds {
    fn default() -> Self {
        Self {
            price_change_pct: 5.0,
            volume_change_pct: 10.0,
            volume_trend_pct: trend_thresholds::SIGNIFICANT_PCT,
            volume_window_minutes: windows::HOURLY_MINUTES,
            base_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackedAsset {
    pub symbol: String,
    pub coingecko_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub coingecko_api_url: String,
    pub tracked_assets: Vec<TrackedAsset>,
    pub anthropic_api_url: String,
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    /// Where narratives are POSTed (PUBLISH_WEBHOOK_URL). None = dry-run log channel.
    pub publish_webhook_url: Option<String>,
    pub thresholds: TriggerThresholds,
    /// Fixed seed for asset order and template selection (RNG_SEED).
    pub rng_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = TriggerThresholds::default();

        let base_interval_secs = parse_env("BASE_INTERVAL_SECS", defaults.base_interval.as_secs())?;
        let thresholds = TriggerThresholds {
            price_change_pct: parse_env("PRICE_CHANGE_THRESHOLD", defaults.price_change_pct)?,
            volume_change_pct: parse_env("VOLUME_CHANGE_THRESHOLD", defaults.volume_change_pct)?,
            volume_trend_pct: parse_env("VOLUME_TREND_THRESHOLD", defaults.volume_trend_pct)?,
            volume_window_minutes: parse_env("VOLUME_WINDOW_MINUTES", defaults.volume_window_minutes)?,
            base_interval: Duration::from_secs(base_interval_secs),
        };

        let rng_seed = match std::env::var("RNG_SEED") {
            Ok(s) => Some(s.trim().parse::<u64>().map_err(|_| {
                AppError::Config("RNG_SEED must be an unsigned integer".to_string())
            })?),
            Err(_) => None,
        };

        let tracked_assets = match std::env::var("TRACKED_ASSETS") {
            Ok(raw) => parse_tracked_assets(&raw)?,
            Err(_) => DEFAULT_TRACKED_ASSETS
                .iter()
                .map(|(symbol, id)| TrackedAsset {
                    symbol: symbol.to_string(),
                    coingecko_id: id.to_string(),
                })
                .collect(),
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "narrator.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            coingecko_api_url: std::env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| COINGECKO_API_URL.to_string()),
            tracked_assets,
            anthropic_api_url: std::env::var("ANTHROPIC_API_URL")
                .unwrap_or_else(|_| ANTHROPIC_API_URL.to_string()),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            anthropic_model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| ANTHROPIC_MODEL.to_string()),
            publish_webhook_url: std::env::var("PUBLISH_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            thresholds,
            rng_seed,
        })
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tracked_assets.iter().map(|a| a.symbol.clone()).collect()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Parse `BTC=bitcoin,ETH=ethereum`. Symbols are upper-cased.
pub fn parse_tracked_assets(raw: &str) -> Result<Vec<TrackedAsset>> {
    let mut assets = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((symbol, id)) = entry.split_once('=') else {
            return Err(AppError::Config(format!(
                "TRACKED_ASSETS entry '{entry}' must look like SYMBOL=coingecko-id"
            )));
        };
        let (symbol, id) = (symbol.trim(), id.trim());
        if symbol.is_empty() || id.is_empty() {
            return Err(AppError::Config(format!("TRACKED_ASSETS entry '{entry}' is incomplete")));
        }
        assets.push(TrackedAsset {
            symbol: symbol.to_uppercase(),
            coingecko_id: id.to_string(),
        });
    }
    if assets.is_empty() {
        return Err(AppError::Config("TRACKED_ASSETS is empty".to_string()));
    }
    Ok(assets)
}
