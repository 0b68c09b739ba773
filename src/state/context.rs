use chrono::{DateTime, Utc};

use crate::scorer::PredictionTracker;
use crate::types::SnapshotMap;

// ---------------------------------------------------------------------------
// EngineContext: all state carried between cycles
// ---------------------------------------------------------------------------

/// Owned by the cycle loop and handed to each evaluation by `&mut`.
///
/// The baseline is one shared map for the whole basket: an emit for any asset
/// replaces every asset's previous snapshot.
#[derive(Debug)]
pub struct EngineContext {
    previous: Option<SnapshotMap>,
    last_cycle_at: DateTime<Utc>,
    pub predictions: PredictionTracker,
}

impl EngineContext {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            previous: None,
            last_cycle_at: started_at,
            predictions: PredictionTracker::new(),
        }
    }

    pub fn previous(&self) -> Option<&SnapshotMap> {
        self.previous.as_ref()
    }

    pub fn replace_baseline(&mut self, current: &SnapshotMap) {
        self.previous = Some(current.clone());
    }

    pub fn last_cycle_at(&self) -> DateTime<Utc> {
        self.last_cycle_at
    }

    /// Called by the loop once a cycle has completed.
    pub fn mark_cycle(&mut self, at: DateTime<Utc>) {
        self.last_cycle_at = at;
    }
}
