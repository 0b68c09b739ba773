use crate::config::mood::{
    RECOVERY_ATH_DISTANCE_PCT, RECOVERY_MIN_PCT, STRONG_MOVE_PCT, VOLATILITY_MAX,
};
use crate::types::{MarketSnapshot, Sentiment};

impl Sentiment {
    /// Coarse mood of an asset from its 24h change and distance to ATH.
    ///
    /// Volatility wins over direction; "recovering" needs a modest gain while
    /// still deep under the all-time high.
    pub fn from_indicators(price_change_24h_pct: f64, ath_change_pct: Option<f64>) -> Self {
        if !price_change_24h_pct.is_finite() {
            return Sentiment::Neutral;
        }
        let volatility = price_change_24h_pct.abs() / 100.0;
        if volatility > VOLATILITY_MAX {
            return Sentiment::Volatile;
        }
        if price_change_24h_pct >= STRONG_MOVE_PCT {
            return Sentiment::Bullish;
        }
        if price_change_24h_pct <= -STRONG_MOVE_PCT {
            return Sentiment::Bearish;
        }
        let deep_under_ath = ath_change_pct.is_some_and(|d| d <= RECOVERY_ATH_DISTANCE_PCT);
        if price_change_24h_pct >= RECOVERY_MIN_PCT && deep_under_ath {
            return Sentiment::Recovering;
        }
        Sentiment::Neutral
    }

    pub fn of(snapshot: &MarketSnapshot) -> Self {
        Self::from_indicators(snapshot.price_change_24h_pct, snapshot.ath_change_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_up_move_is_bullish() {
        assert_eq!(Sentiment::from_indicators(8.0, None), Sentiment::Bullish);
        assert_eq!(Sentiment::from_indicators(5.0, Some(-60.0)), Sentiment::Bullish);
    }

    #[test]
    fn strong_down_move_is_bearish() {
        assert_eq!(Sentiment::from_indicators(-6.0, None), Sentiment::Bearish);
    }

    #[test]
    fn small_move_is_neutral() {
        assert_eq!(Sentiment::from_indicators(1.5, None), Sentiment::Neutral);
        assert_eq!(Sentiment::from_indicators(-4.9, Some(-80.0)), Sentiment::Neutral);
    }

    #[test]
    fn large_move_is_volatile_either_way() {
        assert_eq!(Sentiment::from_indicators(22.0, None), Sentiment::Volatile);
        assert_eq!(Sentiment::from_indicators(-16.0, None), Sentiment::Volatile);
        assert_eq!(Sentiment::from_indicators(15.0, None), Sentiment::Bullish);
    }

    #[test]
    fn modest_gain_far_below_ath_is_recovering() {
        assert_eq!(Sentiment::from_indicators(3.0, Some(-45.0)), Sentiment::Recovering);
        assert_eq!(Sentiment::from_indicators(3.0, Some(-30.0)), Sentiment::Recovering);
        assert_eq!(Sentiment::from_indicators(3.0, Some(-10.0)), Sentiment::Neutral);
        assert_eq!(Sentiment::from_indicators(3.0, None), Sentiment::Neutral);
        assert_eq!(Sentiment::from_indicators(1.9, Some(-45.0)), Sentiment::Neutral);
    }
}
