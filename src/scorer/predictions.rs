use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::debug;

use crate::config::predictions::{MAX_RECORDS, RETENTION_HOURS, WRONG_SCORE};
use crate::types::{PredictionOutcome, PredictionRecord, Sentiment};

/// Rolling buffer of emitted calls, scored lazily against later prices.
#[derive(Debug, Default)]
pub struct PredictionTracker {
    records: VecDeque<PredictionRecord>,
}

impl PredictionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &PredictionRecord> {
        self.records.iter()
    }

    pub fn record(
        &mut self,
        asset: &str,
        narrative: &str,
        sentiment: BTreeMap<String, Sentiment>,
        prices: BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) {
        self.records.push_back(PredictionRecord {
            created_at: now,
            asset: asset.to_string(),
            narrative: narrative.to_string(),
            sentiment,
            prices,
            outcome: PredictionOutcome::Pending,
        });
        self.prune(now);
    }

    /// Drop records 24h or older, then the oldest beyond the cap.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(RETENTION_HOURS);
        self.records.retain(|r| r.created_at > cutoff);
        while self.records.len() > MAX_RECORDS {
            self.records.pop_front();
        }
    }

    /// Self-deprecating aside about the latest wrong call on `asset`, if any.
    pub fn callback<R: Rng>(
        &mut self,
        asset: &str,
        current_prices: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<String> {
        self.prune(now);

        for record in self.records.iter_mut().filter(|r| r.asset == asset) {
            resolve(record, current_prices);
        }

        let miss = self
            .records
            .iter()
            .rev()
            .find(|r| r.asset == asset && r.outcome == PredictionOutcome::Wrong)?;

        let hours = (now - miss.created_at).num_hours().max(1);
        let clause = miss.narrative.split('.').next().unwrap_or_default().trim();
        let text = render_callback(rng.gen_range(0..CALLBACK_TEMPLATES), hours, asset, clause);
        debug!(asset, hours, "prediction callback generated");
        Some(text)
    }
}

/// Score a pending record against current prices. Settled records are left alone.
pub fn resolve(record: &mut PredictionRecord, current_prices: &BTreeMap<String, f64>) {
    if record.outcome != PredictionOutcome::Pending {
        return;
    }
    let wrong = record.prices.iter().any(|(asset, &recorded)| {
        let Some(&current) = current_prices.get(asset) else {
            return false;
        };
        if recorded <= 0.0 || !current.is_finite() {
            return false;
        }
        let delta_pct = (current - recorded) * 100.0 / recorded;
        let weight = record.sentiment.get(asset).map_or(0.0, |s| s.weight());
        weight * delta_pct < WRONG_SCORE
    });
    record.outcome = if wrong {
        PredictionOutcome::Wrong
    } else {
        PredictionOutcome::Right
    };
}

const CALLBACK_TEMPLATES: usize = 5;

fn render_callback(variant: usize, hours: i64, asset: &str, clause: &str) -> String {
    match variant {
        0 => format!("(Unlike my galaxy-brain take {hours}h ago about {clause}... this time I'm sure!)"),
        1 => format!("(Looks like my {hours}h old prediction about {asset} aged like milk. But trust me bro!)"),
        2 => format!(
            "(That awkward moment when your {hours}h old {asset} analysis was completely wrong... but this one's different!)"
        ),
        3 => format!(
            "(My {asset} trading bot would be down bad after that {hours}h old take. Good thing I'm just an analyst!)"
        ),
        _ => format!(
            "(Excuse the {hours}h old miss on {asset}. Even the best crypto analysts are wrong sometimes... just not usually THIS wrong!)"
        ),
    }
}
