//! Entry signal evaluation from indicator snapshots.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::indicators::{IndicatorSnapshot, TrendDirection};
use crate::models::Side;

/// Directional entry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySignal {
    Long,
    Short,
}

impl EntrySignal {
    pub fn side(&self) -> Side {
        match self {
            EntrySignal::Long => Side::Long,
            EntrySignal::Short => Side::Short,
        }
    }
}

/// Pure multi-indicator entry filter.
///
/// All conditions of a direction must hold simultaneously; a missing
/// reading satisfies neither direction. No partial-confidence output.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    /// RSI must be below this for a long entry
    rsi_long_max: Decimal,

    /// RSI must be above this for a short entry
    rsi_short_min: Decimal,

    /// Volume must be at least this fraction of its moving average
    min_volume_factor: Decimal,
}

impl Default for SignalEvaluator {
    fn default() -> Self {
        Self {
            rsi_long_max: dec!(45),
            rsi_short_min: dec!(60),
            min_volume_factor: dec!(0.2),
        }
    }
}

impl SignalEvaluator {
    /// Evaluate one instrument's snapshot against its higher-timeframe
    /// trend. Deterministic, no side effects.
    pub fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        trend: TrendDirection,
    ) -> Option<EntrySignal> {
        // Liquidity gate runs first: thin volume rejects the instrument
        // regardless of every other reading. An unknown moving average
        // cannot gate; an unknown volume reads as zero.
        let volume = snapshot.volume.unwrap_or(Decimal::ZERO);
        if let Some(volume_ma) = snapshot.volume_ma {
            if volume < volume_ma * self.min_volume_factor {
                return None;
            }
        }

        let (Some(rsi), Some(stoch_k), Some(stoch_d), Some(histogram), Some(open), Some(close), Some(ema)) = (
            snapshot.rsi,
            snapshot.stoch_k,
            snapshot.stoch_d,
            snapshot.macd_histogram,
            snapshot.last_open,
            snapshot.last_close,
            snapshot.ema_50,
        ) else {
            return None;
        };

        let long = rsi < self.rsi_long_max
            && stoch_k > stoch_d
            && histogram > Decimal::ZERO
            && close > open
            && close > ema
            && trend == TrendDirection::Up;

        let short = rsi > self.rsi_short_min
            && stoch_k < stoch_d
            && histogram < Decimal::ZERO
            && close < open
            && close < ema
            && trend == TrendDirection::Down;

        match (long, short) {
            (true, false) => Some(EntrySignal::Long),
            (false, true) => Some(EntrySignal::Short),
            _ => None,
        }
    }
}
