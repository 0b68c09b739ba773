use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::smart_money::*;
use crate::types::{MarketSnapshot, SmartMoneySignal, VolumePoint};

/// Volume anomaly heuristics for one asset.
///
/// `hourly` and `daily` are the trailing 60- and 1440-minute windows, oldest
/// first. Unusable input yields [`SmartMoneySignal::neutral`] instead of an error.
pub fn detect(
    snapshot: &MarketSnapshot,
    hourly: &[VolumePoint],
    daily: &[VolumePoint],
    now: DateTime<Utc>,
    zscore_threshold: f64,
) -> SmartMoneySignal {
    let current = snapshot.volume_24h;
    let change = snapshot.price_change_24h_pct;
    if !current.is_finite() || current <= 0.0 || !change.is_finite() {
        warn!(
            asset = %snapshot.symbol,
            volume = current,
            change,
            "smart money: unusable snapshot, returning neutral signal"
        );
        return SmartMoneySignal::neutral();
    }

    let hourly_volumes: Vec<f64> = hourly.iter().map(|p| p.volume).collect();
    let daily_volumes: Vec<f64> = daily.iter().map(|p| p.volume).collect();

    let avg_hourly = mean(&hourly_volumes).unwrap_or(current);
    let avg_daily = mean(&daily_volumes).unwrap_or(current);

    let std_hourly = if hourly_volumes.len() < 2 {
        1.0
    } else {
        sample_std_dev(&hourly_volumes, avg_hourly)
    };
    let volume_z_score = if std_hourly == 0.0 || !std_hourly.is_finite() {
        0.0
    } else {
        (current - avg_hourly) / std_hourly
    };

    let price_direction = if change > 0.0 { 1 } else { -1 };
    let volume_direction = if current > avg_daily { 1 } else { -1 };
    let price_volume_divergence = price_direction != volume_direction;

    let stealth_accumulation =
        change.abs() < STEALTH_MAX_PRICE_CHANGE_PCT && current > avg_daily * STEALTH_VOLUME_MULTIPLIER;

    // 24 hourly slots need the daily window
    let unusual_hours = unusual_hours(&volume_profile(daily, now));
    let volume_cluster_detected = has_volume_cluster(&hourly_volumes, avg_hourly);

    let signal = SmartMoneySignal {
        volume_z_score,
        price_volume_divergence,
        stealth_accumulation,
        abnormal_volume: volume_z_score.abs() > zscore_threshold,
        unusual_hours,
        volume_cluster_detected,
        volume_vs_hourly_avg: ratio_minus_one(current, avg_hourly),
        volume_vs_daily_avg: ratio_minus_one(current, avg_daily),
    };

    debug!(
        asset = %snapshot.symbol,
        z = signal.volume_z_score,
        divergence = signal.price_volume_divergence,
        stealth = signal.stealth_accumulation,
        abnormal = signal.abnormal_volume,
        cluster = signal.volume_cluster_detected,
        "smart money signal computed"
    );
    signal
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Bessel-corrected (n − 1). Callers guarantee at least two values.
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn ratio_minus_one(current: f64, average: f64) -> f64 {
    if average == 0.0 {
        0.0
    } else {
        current / average - 1.0
    }
}

/// Volume summed into trailing one-hour slots; index 0 is the most recent hour.
pub fn volume_profile(points: &[VolumePoint], now: DateTime<Utc>) -> [f64; PROFILE_HOURS] {
    let mut profile = [0.0; PROFILE_HOURS];
    for point in points {
        let age_secs = (now - point.timestamp).num_seconds();
        if age_secs < 0 {
            continue;
        }
        let slot = (age_secs / 3_600) as usize;
        if slot < PROFILE_HOURS {
            profile[slot] += point.volume;
        }
    }
    profile
}

/// Hours-ago labels (1-based) of slots holding more than the unusual share of the total.
fn unusual_hours(profile: &[f64; PROFILE_HOURS]) -> Vec<u8> {
    let total: f64 = profile.iter().sum();
    if total <= 0.0 {
        return Vec::new();
    }
    profile
        .iter()
        .enumerate()
        .filter(|(_, &vol)| vol / total * 100.0 > UNUSUAL_HOUR_SHARE_PCT)
        .map(|(i, _)| (i + 1) as u8)
        .collect()
}

/// Any run of consecutive samples, each above the cluster multiple of the average.
fn has_volume_cluster(volumes: &[f64], avg: f64) -> bool {
    let floor = avg * CLUSTER_VOLUME_MULTIPLIER;
    volumes
        .windows(CLUSTER_LENGTH)
        .any(|run| run.iter().all(|&v| v > floor))
}
