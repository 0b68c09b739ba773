use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::trigger::OUTPERFORMANCE_PCT;
use crate::config::TriggerThresholds;
use crate::detector::SignalService;
use crate::state::EngineContext;
use crate::types::{MarketSnapshot, SnapshotMap, TriggerDecision, TriggerReason, VolumeTrend};

/// Decides whether an asset's latest snapshot warrants a narrative.
///
/// Checks run in a fixed priority order and the first hit is the only reason
/// reported. The regular-interval fallback applies to every asset.
pub struct TriggerEvaluator {
    signals: Arc<SignalService>,
    thresholds: TriggerThresholds,
}

impl TriggerEvaluator {
    pub fn new(signals: Arc<SignalService>, thresholds: TriggerThresholds) -> Self {
        Self { signals, thresholds }
    }

    /// Evaluate `asset` against the context's baseline. On emit, the whole
    /// `current` map becomes the new baseline.
    pub async fn evaluate(
        &self,
        ctx: &mut EngineContext,
        asset: &str,
        current: &SnapshotMap,
        now: DateTime<Utc>,
    ) -> TriggerDecision {
        let decision = match self.first_reason(ctx, asset, current, now).await {
            Some(reason) => TriggerDecision::emit(reason, now),
            None => TriggerDecision::skip(now),
        };

        if decision.should_emit {
            ctx.replace_baseline(current);
            info!(asset, reason = ?decision.reason, "[TRIGGER] update warranted");
        } else {
            debug!(asset, "[TRIGGER] nothing notable");
        }
        decision
    }

    async fn first_reason(
        &self,
        ctx: &EngineContext,
        asset: &str,
        current: &SnapshotMap,
        now: DateTime<Utc>,
    ) -> Option<TriggerReason> {
        let Some(previous) = ctx.previous() else {
            return Some(TriggerReason::InitialPost);
        };

        if let (Some(cur), Some(prev)) = (current.get(asset), previous.get(asset)) {
            if let Some(reason) = self.signal_reason(asset, cur, prev, current, now).await {
                return Some(reason);
            }
        }

        let elapsed = (now - ctx.last_cycle_at()).to_std().unwrap_or_default();
        if elapsed >= self.thresholds.base_interval {
            return Some(TriggerReason::RegularInterval);
        }
        None
    }

    async fn signal_reason(
        &self,
        asset: &str,
        cur: &MarketSnapshot,
        prev: &MarketSnapshot,
        current: &SnapshotMap,
        now: DateTime<Utc>,
    ) -> Option<TriggerReason> {
        let price_delta = pct_delta(cur.price, prev.price);
        if price_delta >= self.thresholds.price_change_pct {
            debug!(asset, price_delta, "[TRIGGER] price moved");
            return Some(TriggerReason::PriceChange);
        }

        let volume_delta = pct_delta(cur.volume_24h, prev.volume_24h);
        if volume_delta >= self.thresholds.volume_change_pct {
            debug!(asset, volume_delta, "[TRIGGER] volume moved");
            return Some(TriggerReason::VolumeChange);
        }

        let trend = self.signals.volume_trend(cur, now).await.trend;
        if trend.is_significant() {
            return Some(if trend == VolumeTrend::SignificantIncrease {
                TriggerReason::VolumeTrendIncrease
            } else {
                TriggerReason::VolumeTrendDecrease
            });
        }

        if self.signals.smart_money(cur, now).await.is_actionable() {
            return Some(TriggerReason::SmartMoney);
        }

        let outperforming = self
            .signals
            .relative(asset, current, now)
            .await
            .is_some_and(|c| c.outperforming && c.performance_diff.abs() > OUTPERFORMANCE_PCT);
        outperforming.then_some(TriggerReason::OutperformingMarket)
    }
}

/// Absolute percent change; 0 when there is no usable previous value.
fn pct_delta(current: f64, previous: f64) -> f64 {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return 0.0;
    }
    ((current - previous) * 100.0 / previous).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{MemoryVolumeStore, RecordingPersistence};
    use crate::types::VolumePoint;
    use chrono::Duration;

    fn snap(symbol: &str, price: f64, volume: f64, change: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: symbol.to_string(),
            price,
            volume_24h: volume,
            price_change_24h_pct: change,
            market_cap: None,
            ath: None,
            ath_change_pct: None,
            timestamp: Utc::now(),
        }
    }

    fn map(snaps: Vec<MarketSnapshot>) -> SnapshotMap {
        snaps.into_iter().map(|s| (s.symbol.clone(), s)).collect()
    }

    fn evaluator_with(volumes: MemoryVolumeStore) -> TriggerEvaluator {
        let thresholds = TriggerThresholds::default();
        let signals = SignalService::new(
            Arc::new(volumes),
            Arc::new(RecordingPersistence::default()),
            thresholds.clone(),
        );
        TriggerEvaluator::new(Arc::new(signals), thresholds)
    }

    fn evaluator() -> TriggerEvaluator {
        evaluator_with(MemoryVolumeStore::new())
    }

    /// Ten flat samples over the last hour.
    fn steady_history(store: &MemoryVolumeStore, asset: &str, now: DateTime<Utc>, volume: f64) {
        let points = (1..=10)
            .rev()
            .map(|i| VolumePoint { timestamp: now - Duration::minutes(i * 5), volume })
            .collect();
        store.insert(asset, points);
    }

    fn primed(first: &SnapshotMap, at: DateTime<Utc>) -> EngineContext {
        let mut ctx = EngineContext::new(at);
        ctx.replace_baseline(first);
        ctx
    }

    #[tokio::test]
    async fn first_evaluation_is_initial_post_then_quiet() {
        let t0 = Utc::now();
        let eval = evaluator();
        let mut ctx = EngineContext::new(t0);
        let first = map(vec![snap("BTC", 100.0, 1_000.0, 1.0)]);

        let decision = eval.evaluate(&mut ctx, "BTC", &first, t0).await;
        assert!(decision.should_emit);
        assert_eq!(decision.reason, Some(TriggerReason::InitialPost));

        let second = map(vec![snap("BTC", 102.0, 1_050.0, 1.0)]);
        let decision = eval.evaluate(&mut ctx, "BTC", &second, t0 + Duration::minutes(1)).await;
        assert!(!decision.should_emit);
        assert_eq!(decision.reason, None);
    }

    #[tokio::test]
    async fn price_change_outranks_volume_change() {
        let t0 = Utc::now();
        let eval = evaluator();
        let mut ctx = primed(&map(vec![snap("ETH", 100.0, 1_000.0, 0.0)]), t0);

        let current = map(vec![snap("ETH", 110.0, 2_000.0, 0.0)]);
        let decision = eval.evaluate(&mut ctx, "ETH", &current, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::PriceChange));
    }

    #[tokio::test]
    async fn price_drop_counts_as_change() {
        let t0 = Utc::now();
        let eval = evaluator();
        let mut ctx = primed(&map(vec![snap("ETH", 100.0, 1_000.0, 0.0)]), t0);

        let current = map(vec![snap("ETH", 95.0, 1_000.0, 0.0)]);
        let decision = eval.evaluate(&mut ctx, "ETH", &current, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::PriceChange));
    }

    #[tokio::test]
    async fn volume_change_when_price_is_flat() {
        let t0 = Utc::now();
        let eval = evaluator();
        let mut ctx = primed(&map(vec![snap("ETH", 100.0, 1_000.0, 0.0)]), t0);

        let current = map(vec![snap("ETH", 101.0, 1_100.0, 0.0)]);
        let decision = eval.evaluate(&mut ctx, "ETH", &current, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::VolumeChange));
    }

    #[tokio::test]
    async fn significant_volume_trend_triggers_with_direction() {
        let t0 = Utc::now();
        let store = MemoryVolumeStore::new();
        steady_history(&store, "SOL", t0, 1_000.0);
        let eval = evaluator_with(store);

        // immediate delta under 10% but 20% over the hourly baseline
        let mut ctx = primed(&map(vec![snap("SOL", 100.0, 1_150.0, 0.5)]), t0);
        let current = map(vec![snap("SOL", 100.0, 1_200.0, 0.5)]);
        let decision = eval.evaluate(&mut ctx, "SOL", &current, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::VolumeTrendIncrease));

        let mut ctx = primed(&map(vec![snap("SOL", 100.0, 850.0, 0.5)]), t0);
        let current = map(vec![snap("SOL", 100.0, 800.0, 0.5)]);
        let decision = eval.evaluate(&mut ctx, "SOL", &current, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::VolumeTrendDecrease));
    }

    #[tokio::test]
    async fn stealth_accumulation_triggers_smart_money() {
        let t0 = Utc::now();
        let store = MemoryVolumeStore::new();
        // daily average 1000 from older samples; nothing in the last hour
        let points = (2..=12)
            .rev()
            .map(|h| VolumePoint { timestamp: t0 - Duration::hours(h), volume: 1_000.0 })
            .collect();
        store.insert("AVAX", points);
        let eval = evaluator_with(store);

        let mut ctx = primed(&map(vec![snap("AVAX", 30.0, 1_550.0, 0.5)]), t0);
        let current = map(vec![snap("AVAX", 30.0, 1_600.0, 0.5)]);
        let decision = eval.evaluate(&mut ctx, "AVAX", &current, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::SmartMoney));
    }

    #[tokio::test]
    async fn outperformance_needs_more_than_five_points() {
        let t0 = Utc::now();
        let eval = evaluator();
        let baseline = map(vec![snap("NEAR", 5.0, 100.0, 9.0), snap("FIL", 4.0, 100.0, 1.0)]);

        let mut ctx = primed(&baseline, t0);
        let decision = eval.evaluate(&mut ctx, "NEAR", &baseline, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::OutperformingMarket));

        let close_race = map(vec![snap("NEAR", 5.0, 100.0, 6.0), snap("FIL", 4.0, 100.0, 1.0)]);
        let mut ctx = primed(&close_race, t0);
        let decision = eval.evaluate(&mut ctx, "NEAR", &close_race, t0).await;
        assert!(!decision.should_emit);
    }

    #[tokio::test]
    async fn comparison_is_stored_during_evaluation() {
        let t0 = Utc::now();
        let persistence = Arc::new(RecordingPersistence::default());
        let thresholds = TriggerThresholds::default();
        let signals = SignalService::new(
            Arc::new(MemoryVolumeStore::new()),
            persistence.clone(),
            thresholds.clone(),
        );
        let eval = TriggerEvaluator::new(Arc::new(signals), thresholds);

        let quiet = map(vec![snap("ARB", 1.0, 100.0, 2.0), snap("OP", 2.0, 100.0, 1.0)]);
        let mut ctx = primed(&quiet, t0);
        let decision = eval.evaluate(&mut ctx, "ARB", &quiet, t0).await;
        assert!(!decision.should_emit);

        let stored = persistence.comparisons.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].asset, "ARB");
    }

    #[tokio::test]
    async fn regular_interval_fallback() {
        let t0 = Utc::now();
        let eval = evaluator();
        let quiet = map(vec![snap("DOT", 7.0, 100.0, 0.0)]);
        let mut ctx = primed(&quiet, t0);

        let early = eval.evaluate(&mut ctx, "DOT", &quiet, t0 + Duration::seconds(299)).await;
        assert!(!early.should_emit);

        let due = eval.evaluate(&mut ctx, "DOT", &quiet, t0 + Duration::seconds(300)).await;
        assert_eq!(due.reason, Some(TriggerReason::RegularInterval));

        // applies even to an asset absent from the baseline
        let newcomer = map(vec![snap("KAITO", 1.0, 10.0, 0.0)]);
        let late = eval.evaluate(&mut ctx, "KAITO", &newcomer, t0 + Duration::seconds(301)).await;
        assert_eq!(late.reason, Some(TriggerReason::RegularInterval));
    }

    #[tokio::test]
    async fn emit_replaces_baseline_for_every_asset() {
        let t0 = Utc::now();
        let eval = evaluator();
        let mut ctx = primed(
            &map(vec![snap("BTC", 100.0, 1_000.0, 0.0), snap("ETH", 10.0, 1_000.0, 0.0)]),
            t0,
        );

        // BTC triggers; ETH also moved 20% but never got evaluated
        let current = map(vec![snap("BTC", 110.0, 1_000.0, 0.0), snap("ETH", 12.0, 1_000.0, 0.0)]);
        let decision = eval.evaluate(&mut ctx, "BTC", &current, t0).await;
        assert_eq!(decision.reason, Some(TriggerReason::PriceChange));

        let decision = eval.evaluate(&mut ctx, "ETH", &current, t0).await;
        assert!(!decision.should_emit, "ETH delta was reset by the shared baseline");
        assert_eq!(ctx.previous().unwrap()["ETH"].price, 12.0);
    }

    #[tokio::test]
    async fn skip_keeps_baseline() {
        let t0 = Utc::now();
        let eval = evaluator();
        let first = map(vec![snap("UNI", 10.0, 100.0, 0.0)]);
        let mut ctx = primed(&first, t0);

        let drift = map(vec![snap("UNI", 10.3, 100.0, 0.0)]);
        assert!(!eval.evaluate(&mut ctx, "UNI", &drift, t0).await.should_emit);
        assert_eq!(ctx.previous().unwrap()["UNI"].price, 10.0);
    }

    #[test]
    fn zero_previous_value_is_no_delta() {
        assert_eq!(pct_delta(50.0, 0.0), 0.0);
        assert!((pct_delta(105.0, 100.0) - 5.0).abs() < 1e-9);
        assert!((pct_delta(95.0, 100.0) - 5.0).abs() < 1e-9);
    }
}
