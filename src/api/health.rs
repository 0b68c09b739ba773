//! Shared health state for the /health endpoint.
//! Updated by the engine loop, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Cycle counters. Written once per cycle, so relaxed ordering is enough.
#[derive(Default)]
pub struct HealthState {
    /// False after a cycle that could not fetch market data.
    pub market_data_ok: AtomicBool,
    /// Nanosecond timestamp of the last completed cycle (0 = none).
    pub last_cycle_at_ns: AtomicU64,
    /// Nanosecond timestamp of the last published narrative (0 = none).
    pub last_post_at_ns: AtomicU64,
    pub cycles_completed: AtomicU64,
    pub posts_published: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, at_ns: u64, market_data_ok: bool) {
        self.market_data_ok.store(market_data_ok, Ordering::Relaxed);
        self.last_cycle_at_ns.store(at_ns, Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post(&self, at_ns: u64) {
        self.last_post_at_ns.store(at_ns, Ordering::Relaxed);
        self.posts_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn market_data_ok(&self) -> bool {
        self.market_data_ok.load(Ordering::Relaxed)
    }

    pub fn last_cycle_at_ns(&self) -> u64 {
        self.last_cycle_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_post_at_ns(&self) -> u64 {
        self.last_post_at_ns.load(Ordering::Relaxed)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn posts_published(&self) -> u64 {
        self.posts_published.load(Ordering::Relaxed)
    }
}
