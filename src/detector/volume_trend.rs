use tracing::{debug, warn};

use crate::config::trend_thresholds::MODERATE_PCT;
use crate::types::{TrendAnalysis, VolumePoint, VolumeTrend};

/// Percent deviation of `current_volume` from the window mean, classified.
///
/// Empty window → `(0, InsufficientData)`. A degenerate baseline never
/// propagates: it maps to `(0, Error)`.
pub fn analyze(current_volume: f64, window: &[VolumePoint], significant_pct: f64) -> TrendAnalysis {
    if window.is_empty() {
        return TrendAnalysis::new(0.0, VolumeTrend::InsufficientData);
    }

    let baseline = window.iter().map(|p| p.volume).sum::<f64>() / window.len() as f64;
    if baseline == 0.0 || !baseline.is_finite() {
        warn!(baseline, points = window.len(), "volume trend: degenerate baseline");
        return TrendAnalysis::new(0.0, VolumeTrend::Error);
    }

    let percent_change = (current_volume - baseline) * 100.0 / baseline;
    if !percent_change.is_finite() {
        warn!(current_volume, baseline, "volume trend: non-finite change");
        return TrendAnalysis::new(0.0, VolumeTrend::Error);
    }

    let trend = classify(percent_change, significant_pct);
    debug!(
        "volume trend: {percent_change:.2}% vs avg | current={current_volume:.0} avg={baseline:.0} | {trend}"
    );
    TrendAnalysis::new(percent_change, trend)
}

/// Closed at every threshold: exactly +significant is significant, exactly +5 is moderate.
pub fn classify(percent_change: f64, significant_pct: f64) -> VolumeTrend {
    if percent_change >= significant_pct {
        VolumeTrend::SignificantIncrease
    } else if percent_change <= -significant_pct {
        VolumeTrend::SignificantDecrease
    } else if percent_change >= MODERATE_PCT {
        VolumeTrend::ModerateIncrease
    } else if percent_change <= -MODERATE_PCT {
        VolumeTrend::ModerateDecrease
    } else {
        VolumeTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn window(volumes: &[f64]) -> Vec<VolumePoint> {
        let now = Utc::now();
        volumes
            .iter()
            .enumerate()
            .map(|(i, &volume)| VolumePoint {
                timestamp: now - Duration::minutes((volumes.len() - i) as i64),
                volume,
            })
            .collect()
    }

    #[test]
    fn empty_window_is_insufficient_data() {
        let result = analyze(1_000.0, &[], 15.0);
        assert_eq!(result.trend, VolumeTrend::InsufficientData);
        assert_eq!(result.percent_change, 0.0);
    }

    #[test]
    fn non_empty_window_is_never_insufficient_data() {
        for volumes in [&[100.0][..], &[100.0, 120.0], &[50.0, 50.0, 50.0]] {
            let result = analyze(100.0, &window(volumes), 15.0);
            assert_ne!(result.trend, VolumeTrend::InsufficientData);
        }
    }

    #[test]
    fn percent_change_is_relative_to_window_mean() {
        // mean = 100 → 150 is +50%
        let result = analyze(150.0, &window(&[80.0, 100.0, 120.0]), 15.0);
        assert!((result.percent_change - 50.0).abs() < 1e-9);
        assert_eq!(result.trend, VolumeTrend::SignificantIncrease);
    }

    #[test]
    fn boundaries_are_closed() {
        assert_eq!(classify(15.0, 15.0), VolumeTrend::SignificantIncrease);
        assert_eq!(classify(14.999, 15.0), VolumeTrend::ModerateIncrease);
        assert_eq!(classify(5.0, 15.0), VolumeTrend::ModerateIncrease);
        assert_eq!(classify(4.999, 15.0), VolumeTrend::Stable);
        assert_eq!(classify(0.0, 15.0), VolumeTrend::Stable);
        assert_eq!(classify(-4.999, 15.0), VolumeTrend::Stable);
        assert_eq!(classify(-5.0, 15.0), VolumeTrend::ModerateDecrease);
        assert_eq!(classify(-14.999, 15.0), VolumeTrend::ModerateDecrease);
        assert_eq!(classify(-15.0, 15.0), VolumeTrend::SignificantDecrease);
    }

    #[test]
    fn classification_is_monotonic() {
        let rank = |t: VolumeTrend| match t {
            VolumeTrend::SignificantDecrease => 0,
            VolumeTrend::ModerateDecrease => 1,
            VolumeTrend::Stable => 2,
            VolumeTrend::ModerateIncrease => 3,
            VolumeTrend::SignificantIncrease => 4,
            other => panic!("unexpected class {other}"),
        };
        let mut prev = 0;
        let mut pct = -40.0;
        while pct <= 40.0 {
            let r = rank(classify(pct, 15.0));
            assert!(r >= prev, "class went backwards at {pct}");
            prev = r;
            pct += 0.25;
        }
    }

    #[test]
    fn exact_fifteen_percent_through_analyze() {
        let result = analyze(115.0, &window(&[100.0, 100.0]), 15.0);
        assert_eq!(result.trend, VolumeTrend::SignificantIncrease);
    }

    #[test]
    fn zero_baseline_maps_to_error() {
        let result = analyze(100.0, &window(&[0.0, 0.0]), 15.0);
        assert_eq!(result.trend, VolumeTrend::Error);
        assert_eq!(result.percent_change, 0.0);
    }

    #[test]
    fn custom_significant_threshold() {
        let result = analyze(125.0, &window(&[100.0]), 30.0);
        assert_eq!(result.trend, VolumeTrend::ModerateIncrease);
    }
}
