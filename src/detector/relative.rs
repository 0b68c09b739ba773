use std::collections::HashMap;

use tracing::{debug, warn};

use crate::types::{
    CorrelationStrength, MarketSnapshot, PeerCorrelation, PeerStrength, RelativeComparison,
    SnapshotMap,
};

/// +1 for strictly positive, −1 otherwise (a flat 0% counts as down).
fn direction(change: f64) -> i8 {
    if change > 0.0 {
        1
    } else {
        -1
    }
}

fn usable(s: &MarketSnapshot) -> bool {
    s.price_change_24h_pct.is_finite() && s.volume_24h.is_finite()
}

/// Compare `asset` against every other usable asset in the snapshot.
///
/// `volume_changes` holds each asset's volume-trend percent change against its
/// own historical window; peers without one are left out of the volume average.
pub fn compare(
    asset: &str,
    snapshots: &SnapshotMap,
    volume_changes: &HashMap<String, f64>,
) -> Option<RelativeComparison> {
    let Some(subject) = snapshots.get(asset).filter(|s| usable(s)) else {
        warn!(asset, "relative comparison: subject missing from snapshot");
        return None;
    };

    let peers: Vec<&MarketSnapshot> = snapshots
        .iter()
        .filter(|(symbol, s)| symbol.as_str() != asset && usable(s))
        .map(|(_, s)| s)
        .collect();
    if peers.is_empty() {
        warn!(asset, "relative comparison: empty basket");
        return None;
    }

    let basket_avg_change =
        peers.iter().map(|p| p.price_change_24h_pct).sum::<f64>() / peers.len() as f64;
    let performance_diff = subject.price_change_24h_pct - basket_avg_change;

    let peer_volume_changes: Vec<f64> = peers
        .iter()
        .filter_map(|p| volume_changes.get(&p.symbol).copied())
        .filter(|v| v.is_finite())
        .collect();
    let basket_avg_volume_change = if peer_volume_changes.is_empty() {
        0.0
    } else {
        peer_volume_changes.iter().sum::<f64>() / peer_volume_changes.len() as f64
    };
    let own_volume_change = volume_changes.get(asset).copied().unwrap_or(0.0);

    let subject_direction = direction(subject.price_change_24h_pct);
    let correlations = peers
        .iter()
        .map(|p| PeerCorrelation {
            peer: p.symbol.clone(),
            correlated: subject_direction == direction(p.price_change_24h_pct),
            asset_change: subject.price_change_24h_pct,
            peer_change: p.price_change_24h_pct,
        })
        .collect();

    let comparison = RelativeComparison {
        asset: asset.to_string(),
        performance_diff,
        volume_growth_diff: own_volume_change - basket_avg_volume_change,
        correlations,
        outperforming: performance_diff > 0.0,
        basket_size: peers.len(),
    };
    debug!(
        asset,
        performance_diff = comparison.performance_diff,
        volume_growth_diff = comparison.volume_growth_diff,
        basket = comparison.basket_size,
        "relative comparison computed"
    );
    Some(comparison)
}

/// 1 − |a − b| / max(|a|, |b|), clamped to [0, 1]. Two zeros are identical.
fn similarity(a: f64, b: f64) -> f64 {
    let denom = a.abs().max(b.abs());
    if denom == 0.0 {
        return 1.0;
    }
    (1.0 - (a - b).abs() / denom).clamp(0.0, 1.0)
}

/// Magnitude-aware companion to the directional proxy: how close each peer's
/// 24h change and volume are to the subject's.
pub fn correlation_strength(asset: &str, snapshots: &SnapshotMap) -> Option<CorrelationStrength> {
    let subject = snapshots.get(asset).filter(|s| usable(s))?;

    let peers: Vec<PeerStrength> = snapshots
        .iter()
        .filter(|(symbol, s)| symbol.as_str() != asset && usable(s))
        .map(|(symbol, s)| PeerStrength {
            peer: symbol.clone(),
            price_similarity: similarity(subject.price_change_24h_pct, s.price_change_24h_pct),
            volume_similarity: similarity(subject.volume_24h, s.volume_24h),
        })
        .collect();
    if peers.is_empty() {
        return None;
    }

    let n = peers.len() as f64;
    let avg_price_similarity = peers.iter().map(|p| p.price_similarity).sum::<f64>() / n;
    let avg_volume_similarity = peers.iter().map(|p| p.volume_similarity).sum::<f64>() / n;
    Some(CorrelationStrength {
        asset: asset.to_string(),
        peers,
        avg_price_similarity,
        avg_volume_similarity,
    })
}
