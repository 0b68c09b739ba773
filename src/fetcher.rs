use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::MarketDataProvider;
use crate::config::{Config, TrackedAsset, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;
use crate::types::{MarketSnapshot, SnapshotMap};

/// Basket snapshots from CoinGecko's `/coins/markets`.
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
    assets: Vec<TrackedAsset>,
    retry: RetryPolicy,
}

impl CoinGeckoProvider {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.coingecko_api_url.trim_end_matches('/').to_string(),
            assets: cfg.tracked_assets.clone(),
            retry: RetryPolicy::default(),
        })
    }

    fn markets_url(&self) -> String {
        let ids: Vec<&str> = self.assets.iter().map(|a| a.coingecko_id.as_str()).collect();
        format!(
            "{}/coins/markets?vs_currency=usd&ids={}&order=market_cap_desc&per_page=100&page=1&sparkline=false&price_change_percentage=24h",
            self.base_url,
            ids.join(",")
        )
    }

    async fn fetch_once(&self) -> Result<SnapshotMap> {
        let resp = self.client.get(self.markets_url()).send().await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        parse_markets(&body, &self.assets, Utc::now())
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    async fn fetch_snapshot(&self) -> Result<SnapshotMap> {
        let snapshots = self
            .retry
            .run("CoinGecko fetch", || self.fetch_once())
            .await
            .map_err(|e| AppError::DataUnavailable(e.to_string()))?;
        info!(assets = snapshots.len(), "[FETCH] market snapshot received");
        Ok(snapshots)
    }
}

/// Map a `/coins/markets` array onto configured symbols.
///
/// Entries are keyed by CoinGecko id, so renamed tickers (MATIC → POL) land on
/// the configured symbol. Entries without a price or volume are skipped; an
/// empty result is an error.
pub fn parse_markets(
    body: &serde_json::Value,
    assets: &[TrackedAsset],
    fetched_at: DateTime<Utc>,
) -> Result<SnapshotMap> {
    let Some(items) = body.as_array() else {
        return Err(AppError::DataUnavailable("/coins/markets response was not an array".to_string()));
    };

    let by_id: HashMap<&str, &str> = assets
        .iter()
        .map(|a| (a.coingecko_id.as_str(), a.symbol.as_str()))
        .collect();

    let mut snapshots = SnapshotMap::new();
    for item in items {
        let Some(id) = item["id"].as_str() else { continue };
        let Some(&symbol) = by_id.get(id) else {
            debug!(id, "ignoring untracked coin");
            continue;
        };
        let (Some(price), Some(volume)) = (item["current_price"].as_f64(), item["total_volume"].as_f64()) else {
            warn!(asset = symbol, "skipping entry without price or volume");
            continue;
        };
        snapshots.insert(
            symbol.to_string(),
            MarketSnapshot {
                symbol: symbol.to_string(),
                price,
                volume_24h: volume,
                price_change_24h_pct: item["price_change_percentage_24h"].as_f64().unwrap_or(0.0),
                market_cap: item["market_cap"].as_f64(),
                ath: item["ath"].as_f64(),
                ath_change_pct: item["ath_change_percentage"].as_f64(),
                timestamp: fetched_at,
            },
        );
    }

    if snapshots.is_empty() {
        return Err(AppError::DataUnavailable("no tracked assets in /coins/markets response".to_string()));
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assets() -> Vec<TrackedAsset> {
        [("BTC", "bitcoin"), ("POL", "matic-network")]
            .into_iter()
            .map(|(s, id)| TrackedAsset { symbol: s.to_string(), coingecko_id: id.to_string() })
            .collect()
    }

    #[test]
    fn parses_tracked_entries_by_id() {
        let body = json!([
            {
                "id": "bitcoin", "symbol": "btc", "current_price": 64000.5, "total_volume": 2.1e10,
                "price_change_percentage_24h": -1.25, "market_cap": 1.2e12,
                "ath": 73000.0, "ath_change_percentage": -12.3
            },
            {
                "id": "matic-network", "symbol": "matic", "current_price": 0.52, "total_volume": 3.0e8,
                "price_change_percentage_24h": null, "market_cap": null, "ath": null, "ath_change_percentage": null
            },
            { "id": "dogecoin", "symbol": "doge", "current_price": 0.1, "total_volume": 1.0 }
        ]);
        let now = Utc::now();
        let map = parse_markets(&body, &assets(), now).unwrap();
        assert_eq!(map.len(), 2);

        let btc = &map["BTC"];
        assert_eq!(btc.price, 64000.5);
        assert_eq!(btc.price_change_24h_pct, -1.25);
        assert_eq!(btc.ath_change_pct, Some(-12.3));
        assert_eq!(btc.timestamp, now);

        let pol = &map["POL"];
        assert_eq!(pol.symbol, "POL");
        assert_eq!(pol.price_change_24h_pct, 0.0);
        assert_eq!(pol.market_cap, None);
    }

    #[test]
    fn entries_without_price_are_skipped() {
        let body = json!([
            { "id": "bitcoin", "current_price": null, "total_volume": 1.0 },
            { "id": "matic-network", "current_price": 0.5, "total_volume": 10.0 }
        ]);
        let map = parse_markets(&body, &assets(), Utc::now()).unwrap();
        assert!(map.contains_key("POL"));
        assert!(!map.contains_key("BTC"));
    }

    #[test]
    fn unusable_responses_are_data_unavailable() {
        let err = parse_markets(&json!({"status": {"error_code": 429}}), &assets(), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::DataUnavailable(_)));

        let err = parse_markets(&json!([]), &assets(), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::DataUnavailable(_)));
    }
}
