pub mod models;
pub mod store;

use chrono::{DateTime, TimeZone, Utc};

pub use store::SqliteStore;

/// Storage representation of a timestamp.
pub fn to_ns(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub fn from_ns(ns: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(ns)
}
