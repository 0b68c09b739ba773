use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::backend::{
    HistoricalVolumeStore, MarketDataProvider, NarrativeGenerator, PersistenceStore,
    PostedContentSource, PublishingChannel,
};
use crate::config::windows::CHAIN_STATS_HOURS;
use crate::config::{TriggerThresholds, ERROR_BACKOFF_SECS};
use crate::db::to_ns;
use crate::detector::{SignalService, TriggerEvaluator};
use crate::filter::DuplicateFilter;
use crate::narrator::{NarrativeContext, FOCUS_AREAS};
use crate::state::EngineContext;
use crate::types::{price_map, PostRecord, SnapshotMap, TriggerReason};

/// What a single cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Posted { asset: String, reason: TriggerReason },
    NothingPosted,
    DataUnavailable,
}

/// External collaborators the engine is wired to.
pub struct Collaborators {
    pub provider: Arc<dyn MarketDataProvider>,
    pub volumes: Arc<dyn HistoricalVolumeStore>,
    pub posts: Arc<dyn PostedContentSource>,
    pub persistence: Arc<dyn PersistenceStore>,
    pub generator: Arc<dyn NarrativeGenerator>,
    pub publisher: Arc<dyn PublishingChannel>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    provider: Arc<dyn MarketDataProvider>,
    persistence: Arc<dyn PersistenceStore>,
    generator: Arc<dyn NarrativeGenerator>,
    publisher: Arc<dyn PublishingChannel>,
    signals: Arc<SignalService>,
    evaluator: TriggerEvaluator,
    filter: DuplicateFilter,
    health: Arc<HealthState>,
    base_interval: Duration,
    rng: StdRng,
}

impl Engine {
    pub fn new(
        parts: Collaborators,
        thresholds: TriggerThresholds,
        health: Arc<HealthState>,
        rng: StdRng,
    ) -> Self {
        let signals = Arc::new(SignalService::new(
            parts.volumes,
            Arc::clone(&parts.persistence),
            thresholds.clone(),
        ));
        Self {
            provider: parts.provider,
            persistence: parts.persistence,
            generator: parts.generator,
            publisher: parts.publisher,
            evaluator: TriggerEvaluator::new(Arc::clone(&signals), thresholds.clone()),
            signals,
            filter: DuplicateFilter::new(parts.posts),
            health,
            base_interval: thresholds.base_interval,
            rng,
        }
    }

    /// Cycle loop. Exits between cycles once `shutdown` flips to true.
    pub async fn run(mut self, mut ctx: EngineContext, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.base_interval.as_secs(), "Engine started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run_cycle(&mut ctx, &shutdown).await;
            let wait = match &outcome {
                CycleOutcome::DataUnavailable => Duration::from_secs(ERROR_BACKOFF_SECS),
                _ => {
                    let since_last = (Utc::now() - ctx.last_cycle_at()).to_std().unwrap_or_default();
                    self.base_interval.saturating_sub(since_last)
                }
            };
            debug!(?outcome, wait_secs = wait.as_secs_f64(), "cycle finished");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                Ok(()) = shutdown.changed() => {}
            }
            if !matches!(outcome, CycleOutcome::DataUnavailable) {
                ctx.mark_cycle(Utc::now());
            }
        }
        info!("Engine stopped");
    }

    /// One pass over the basket. Posts at most one narrative.
    pub async fn run_cycle(
        &mut self,
        ctx: &mut EngineContext,
        shutdown: &watch::Receiver<bool>,
    ) -> CycleOutcome {
        let snapshots = match self.provider.fetch_snapshot().await {
            Ok(s) => s,
            Err(e) => {
                warn!("[CYCLE] skipping cycle: {e}");
                self.health.record_cycle(ns(Utc::now()), false);
                return CycleOutcome::DataUnavailable;
            }
        };
        // Taken after the fetch so the windows below cover the samples just stored.
        let now = Utc::now();

        for snapshot in snapshots.values() {
            if let Err(e) = self.persistence.save_market_data(snapshot).await {
                warn!(asset = %snapshot.symbol, "failed to store market data: {e}");
            }
        }

        let mut assets: Vec<String> = snapshots.keys().cloned().collect();
        assets.shuffle(&mut self.rng);

        let mut outcome = CycleOutcome::NothingPosted;
        for asset in &assets {
            if *shutdown.borrow() {
                info!("[CYCLE] shutdown requested, stopping before {asset}");
                break;
            }
            let decision = self.evaluator.evaluate(ctx, asset, &snapshots, now).await;
            let Some(reason) = decision.reason else { continue };
            if self.try_post(ctx, asset, reason, &snapshots, now).await {
                outcome = CycleOutcome::Posted { asset: asset.clone(), reason };
                break;
            }
        }

        if outcome == CycleOutcome::NothingPosted {
            info!(candidates = assets.len(), "[CYCLE] nothing posted this cycle");
        }
        self.health.record_cycle(ns(now), true);
        outcome
    }

    /// Generate, check, publish and record one narrative. False moves on to the next asset.
    async fn try_post(
        &mut self,
        ctx: &mut EngineContext,
        asset: &str,
        reason: TriggerReason,
        snapshots: &SnapshotMap,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(snapshot) = snapshots.get(asset) else { return false };
        let Some(bundle) = self.signals.bundle(asset, snapshots, now).await else { return false };

        let chain_stats = self
            .persistence
            .chain_stats(asset, CHAIN_STATS_HOURS, now)
            .await
            .unwrap_or_else(|e| {
                warn!(asset, "chain stats unavailable: {e}");
                None
            });
        let prices = price_map(snapshots);
        let callback = ctx.predictions.callback(asset, &prices, now, &mut self.rng);
        let focus = FOCUS_AREAS[self.rng.gen_range(0..FOCUS_AREAS.len())];
        let narrative =
            NarrativeContext::new(snapshot, snapshots, reason, bundle, chain_stats, callback, focus);

        let text = match self.generator.generate(&narrative).await {
            Ok(t) => t,
            Err(e) => {
                warn!(asset, "narrative generation failed, trying next asset: {e}");
                return false;
            }
        };

        let recent = self.publisher.recent_posts().await.unwrap_or_else(|e| {
            warn!("could not read channel's recent posts: {e}");
            Vec::new()
        });
        if self.filter.is_duplicate(&text, &recent, now).await {
            info!(asset, "[CYCLE] narrative is a duplicate, trying next asset");
            return false;
        }

        match self.publisher.publish(&text).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(asset, "publishing refused, trying next asset");
                return false;
            }
            Err(e) => {
                warn!(asset, "publishing failed, trying next asset: {e}");
                return false;
            }
        }

        ctx.predictions.record(
            asset,
            &text,
            BTreeMap::from([(asset.to_string(), narrative.mood)]),
            BTreeMap::from([(asset.to_string(), snapshot.price)]),
            now,
        );

        let post = PostRecord {
            content: text,
            asset: asset.to_string(),
            trigger: reason,
            sentiment: narrative.mood,
            price: snapshot.price,
            volume: snapshot.volume_24h,
            posted_at: now,
        };
        if let Err(e) = self.persistence.save_posted_content(&post).await {
            warn!(asset, "failed to store posted content: {e}");
        }
        if let Err(e) = self.persistence.save_mood(asset, narrative.mood, snapshot, now).await {
            warn!(asset, "failed to store mood: {e}");
        }
        self.signals.persist(asset, &narrative.signals, now).await;

        self.health.record_post(ns(now));
        info!(asset, %reason, mood = %narrative.mood, "[CYCLE] narrative published");
        true
    }
}

fn ns(at: DateTime<Utc>) -> u64 {
    to_ns(at).max(0) as u64
}
