//! Initial protective-stop policy.

use rust_decimal::Decimal;

use crate::models::Side;

use super::TradeConfig;

/// Compute the initial stop price for a fill at `price`.
///
/// Two candidates: a fixed percentage offset and an ATR-scaled offset
/// (skipped when ATR is unavailable or non-positive). The chosen stop is
/// `min` of the two for a long and `max` for a short.
pub fn initial_stop(
    side: Side,
    price: Decimal,
    atr: Option<Decimal>,
    config: &TradeConfig,
) -> Decimal {
    let fixed = match side {
        Side::Long => price * (Decimal::ONE - config.stop_loss_percent),
        Side::Short => price * (Decimal::ONE + config.stop_loss_percent),
    };

    let Some(atr) = atr.filter(|a| *a > Decimal::ZERO) else {
        return fixed;
    };

    let offset = atr * config.atr_stop_multiplier;
    match side {
        Side::Long => fixed.min(price - offset),
        Side::Short => fixed.max(price + offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_long_stop_picks_min_of_candidates() {
        let config = TradeConfig::default();

        // fixed = 100 * 0.97 = 97.0; atr stop = 100 - 2*1.2 = 97.6
        let stop = initial_stop(Side::Long, dec!(100), Some(dec!(2)), &config);
        assert_eq!(stop, dec!(97.0));

        // Wider ATR pushes the stop below the fixed candidate
        let stop = initial_stop(Side::Long, dec!(100), Some(dec!(4)), &config);
        assert_eq!(stop, dec!(95.2));
    }

    #[test]
    fn test_short_stop_picks_max_of_candidates() {
        let config = TradeConfig::default();

        // fixed = 103.0; atr stop = 102.4
        let stop = initial_stop(Side::Short, dec!(100), Some(dec!(2)), &config);
        assert_eq!(stop, dec!(103.0));

        let stop = initial_stop(Side::Short, dec!(100), Some(dec!(4)), &config);
        assert_eq!(stop, dec!(104.8));
    }

    #[test]
    fn test_missing_or_zero_atr_uses_fixed_stop() {
        let config = TradeConfig::default();

        assert_eq!(initial_stop(Side::Long, dec!(100), None, &config), dec!(97.0));
        assert_eq!(
            initial_stop(Side::Long, dec!(100), Some(Decimal::ZERO), &config),
            dec!(97.0)
        );
        assert_eq!(
            initial_stop(Side::Short, dec!(100), None, &config),
            dec!(103.0)
        );
    }

    #[test]
    fn test_stop_lands_on_loss_side_of_entry() {
        let config = TradeConfig::default();

        for atr in [None, Some(dec!(0.5)), Some(dec!(3))] {
            assert!(initial_stop(Side::Long, dec!(250), atr, &config) < dec!(250));
            assert!(initial_stop(Side::Short, dec!(250), atr, &config) > dec!(250));
        }
    }
}
