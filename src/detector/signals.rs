use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::backend::{HistoricalVolumeStore, PersistenceStore};
use crate::config::smart_money::ZSCORE_THRESHOLD;
use crate::config::windows::{DAILY_MINUTES, HOURLY_MINUTES};
use crate::config::TriggerThresholds;
use crate::detector::{relative, smart_money, volume_trend};
use crate::types::{
    MarketSnapshot, RelativeComparison, SignalBundle, SmartMoneySignal, SnapshotMap,
    TrendAnalysis, VolumeTrend,
};

/// Pulls historical windows for the pure analyzers and persists their output.
///
/// Store failures degrade to the analyzers' neutral results.
pub struct SignalService {
    volumes: Arc<dyn HistoricalVolumeStore>,
    persistence: Arc<dyn PersistenceStore>,
    thresholds: TriggerThresholds,
}

impl SignalService {
    pub fn new(
        volumes: Arc<dyn HistoricalVolumeStore>,
        persistence: Arc<dyn PersistenceStore>,
        thresholds: TriggerThresholds,
    ) -> Self {
        Self { volumes, persistence, thresholds }
    }

    pub async fn volume_trend(&self, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> TrendAnalysis {
        match self
            .volumes
            .volume_window(&snapshot.symbol, self.thresholds.volume_window_minutes, now)
            .await
        {
            Ok(window) => volume_trend::analyze(snapshot.volume_24h, &window, self.thresholds.volume_trend_pct),
            Err(e) => {
                warn!(asset = %snapshot.symbol, "volume window unavailable: {e}");
                TrendAnalysis::new(0.0, VolumeTrend::InsufficientData)
            }
        }
    }

    pub async fn smart_money(&self, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> SmartMoneySignal {
        let hourly = self.volumes.volume_window(&snapshot.symbol, HOURLY_MINUTES, now).await;
        let daily = self.volumes.volume_window(&snapshot.symbol, DAILY_MINUTES, now).await;
        match (hourly, daily) {
            (Ok(hourly), Ok(daily)) => smart_money::detect(snapshot, &hourly, &daily, now, ZSCORE_THRESHOLD),
            (Err(e), _) | (_, Err(e)) => {
                warn!(asset = %snapshot.symbol, "smart money windows unavailable: {e}");
                SmartMoneySignal::neutral()
            }
        }
    }

    /// Each asset's volume-trend percent change against its own window.
    async fn volume_changes(&self, snapshots: &SnapshotMap, now: DateTime<Utc>) -> HashMap<String, f64> {
        let mut changes = HashMap::with_capacity(snapshots.len());
        for (symbol, snapshot) in snapshots {
            let trend = self.volume_trend(snapshot, now).await;
            if matches!(trend.trend, VolumeTrend::InsufficientData | VolumeTrend::Error) {
                continue;
            }
            changes.insert(symbol.clone(), trend.percent_change);
        }
        changes
    }

    /// Compares `asset` with the basket and stores the comparison. A failed
    /// write is logged and the comparison is still returned.
    pub async fn relative(
        &self,
        asset: &str,
        snapshots: &SnapshotMap,
        now: DateTime<Utc>,
    ) -> Option<RelativeComparison> {
        let changes = self.volume_changes(snapshots, now).await;
        let comparison = relative::compare(asset, snapshots, &changes)?;
        if let Err(e) = self.persistence.save_comparison(&comparison, now).await {
            warn!(asset, "failed to store relative comparison: {e}");
        }
        Some(comparison)
    }

    /// Quantitative context for one asset. None when the asset is not in the snapshot.
    pub async fn bundle(
        &self,
        asset: &str,
        snapshots: &SnapshotMap,
        now: DateTime<Utc>,
    ) -> Option<SignalBundle> {
        let snapshot = snapshots.get(asset)?;
        Some(SignalBundle {
            volume_trend: self.volume_trend(snapshot, now).await,
            smart_money: self.smart_money(snapshot, now).await,
            relative: self.relative(asset, snapshots, now).await,
            correlation_strength: relative::correlation_strength(asset, snapshots),
        })
    }

    /// Fire-and-forget writes of a posted asset's signals. The comparison was
    /// already stored when it was computed.
    pub async fn persist(&self, asset: &str, bundle: &SignalBundle, at: DateTime<Utc>) {
        if let Err(e) = self.persistence.save_smart_money(asset, &bundle.smart_money, at).await {
            warn!(asset, "failed to store smart money signal: {e}");
        }
        if let Some(strength) = &bundle.correlation_strength {
            if let Err(e) = self.persistence.save_correlations(strength, at).await {
                warn!(asset, "failed to store correlations: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{MemoryVolumeStore, RecordingPersistence};
    use crate::types::VolumePoint;
    use chrono::Duration;

    fn snap(symbol: &str, change: f64, volume: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: symbol.to_string(),
            price: 1.0,
            volume_24h: volume,
            price_change_24h_pct: change,
            market_cap: None,
            ath: None,
            ath_change_pct: None,
            timestamp: Utc::now(),
        }
    }

    fn flat(now: DateTime<Utc>, volume: f64) -> Vec<VolumePoint> {
        (1..=5)
            .rev()
            .map(|i| VolumePoint { timestamp: now - Duration::minutes(i * 10), volume })
            .collect()
    }

    #[tokio::test]
    async fn bundle_combines_all_analyzers() {
        let now = Utc::now();
        let volumes = Arc::new(MemoryVolumeStore::new());
        volumes.insert("BTC", flat(now, 100.0));
        volumes.insert("ETH", flat(now, 100.0));
        let persistence = Arc::new(RecordingPersistence::default());
        let service = SignalService::new(volumes, persistence.clone(), TriggerThresholds::default());

        let map: SnapshotMap = [snap("BTC", 3.0, 130.0), snap("ETH", -1.0, 110.0)]
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();

        let bundle = service.bundle("BTC", &map, now).await.unwrap();
        assert_eq!(persistence.comparisons.lock().unwrap().len(), 1);
        assert_eq!(bundle.volume_trend.trend, VolumeTrend::SignificantIncrease);
        let relative = bundle.relative.clone().unwrap();
        assert!((relative.performance_diff - 4.0).abs() < 1e-9);
        // BTC +30% vs ETH +10%
        assert!((relative.volume_growth_diff - 20.0).abs() < 1e-9);
        assert!(bundle.correlation_strength.is_some());

        service.persist("BTC", &bundle, now).await;
        assert_eq!(persistence.smart_money.lock().unwrap().as_slice(), ["BTC".to_string()]);
        assert_eq!(persistence.comparisons.lock().unwrap().len(), 1);
        assert_eq!(persistence.correlations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_history_degrades_to_neutral() {
        let now = Utc::now();
        let service = SignalService::new(
            Arc::new(MemoryVolumeStore::new()),
            Arc::new(RecordingPersistence::failing()),
            TriggerThresholds::default(),
        );
        let map: SnapshotMap = [("SOL".to_string(), snap("SOL", 1.0, 500.0))].into_iter().collect();

        let bundle = service.bundle("SOL", &map, now).await.unwrap();
        assert_eq!(bundle.volume_trend.trend, VolumeTrend::InsufficientData);
        assert!(!bundle.smart_money.is_actionable());
        assert!(bundle.relative.is_none());

        // failing writes are swallowed
        service.persist("SOL", &bundle, now).await;
        assert!(service.bundle("DOGE", &map, now).await.is_none());
    }

    #[tokio::test]
    async fn comparison_survives_failed_write() {
        let now = Utc::now();
        let service = SignalService::new(
            Arc::new(MemoryVolumeStore::new()),
            Arc::new(RecordingPersistence::failing()),
            TriggerThresholds::default(),
        );
        let map: SnapshotMap = [snap("BTC", 4.0, 100.0), snap("ETH", 1.0, 100.0)]
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();

        let comparison = service.relative("BTC", &map, now).await.unwrap();
        assert!(comparison.outperforming);
        assert!((comparison.performance_diff - 3.0).abs() < 1e-9);
    }
}
