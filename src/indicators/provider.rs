//! Indicator computation over candle series.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, FastStochastic,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

use crate::models::Candle;

use super::{IndicatorSnapshot, TrendDirection};

/// Computes [`IndicatorSnapshot`]s and higher-timeframe trend direction.
///
/// Stateless between calls: each computation replays the full series, so a
/// snapshot depends only on the candles passed in.
#[derive(Debug, Clone)]
pub struct IndicatorProvider {
    rsi_period: usize,
    macd_fast: usize,
    macd_slow: usize,
    macd_signal: usize,
    stoch_period: usize,
    stoch_smooth: usize,
    ema_period: usize,
    atr_period: usize,
    volume_ma_period: usize,
}

impl Default for IndicatorProvider {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_period: 14,
            stoch_smooth: 3,
            ema_period: 50,
            atr_period: 14,
            volume_ma_period: 20,
        }
    }
}

impl IndicatorProvider {
    /// Compute a snapshot from a chronologically ordered candle series.
    ///
    /// Readings whose warm-up exceeds the series length come back `None`.
    pub fn compute(&self, candles: &[Candle]) -> IndicatorSnapshot {
        let mut snapshot = IndicatorSnapshot::default();

        let Some(last) = candles.last() else {
            return snapshot;
        };
        snapshot.last_open = Some(last.open);
        snapshot.last_close = Some(last.close);
        snapshot.volume = Some(last.volume);

        let closes: Vec<f64> = candles.iter().filter_map(|c| c.close.to_f64()).collect();
        if closes.len() != candles.len() {
            return snapshot;
        }
        let len = closes.len();

        // RSI, and the raw series for stochastic-RSI
        if let Ok(mut rsi_ind) = RelativeStrengthIndex::new(self.rsi_period) {
            let rsi_series: Vec<f64> = closes.iter().map(|&c| rsi_ind.next(c)).collect();

            if len > self.rsi_period {
                snapshot.rsi = rsi_series.last().copied().and_then(Decimal::from_f64);
            }

            let stoch_warmup = self.rsi_period + self.stoch_period + 2 * self.stoch_smooth;
            if len >= stoch_warmup {
                if let (Ok(mut stoch), Ok(mut smooth_k), Ok(mut smooth_d)) = (
                    FastStochastic::new(self.stoch_period),
                    SimpleMovingAverage::new(self.stoch_smooth),
                    SimpleMovingAverage::new(self.stoch_smooth),
                ) {
                    let mut k = f64::NAN;
                    let mut d = f64::NAN;
                    // Skip the RSI warm-up region so the stochastic window
                    // never sees partially formed values.
                    for &value in &rsi_series[self.rsi_period..] {
                        k = smooth_k.next(stoch.next(value));
                        d = smooth_d.next(k);
                    }
                    snapshot.stoch_k = Decimal::from_f64(k);
                    snapshot.stoch_d = Decimal::from_f64(d);
                }
            }
        }

        if len >= self.macd_slow + self.macd_signal {
            if let Ok(mut macd) =
                MovingAverageConvergenceDivergence::new(self.macd_fast, self.macd_slow, self.macd_signal)
            {
                let mut histogram = f64::NAN;
                for &close in &closes {
                    histogram = macd.next(close).histogram;
                }
                snapshot.macd_histogram = Decimal::from_f64(histogram);
            }
        }

        if len >= self.ema_period {
            if let Ok(mut ema) = ExponentialMovingAverage::new(self.ema_period) {
                let mut value = f64::NAN;
                for &close in &closes {
                    value = ema.next(close);
                }
                snapshot.ema_50 = Decimal::from_f64(value);
            }
        }

        if len >= self.atr_period {
            if let Ok(mut atr) = AverageTrueRange::new(self.atr_period) {
                let mut value = f64::NAN;
                for candle in candles {
                    let item = DataItem::builder()
                        .open(candle.open.to_f64().unwrap_or(0.0))
                        .high(candle.high.to_f64().unwrap_or(0.0))
                        .low(candle.low.to_f64().unwrap_or(0.0))
                        .close(candle.close.to_f64().unwrap_or(0.0))
                        .volume(candle.volume.to_f64().unwrap_or(0.0))
                        .build();
                    if let Ok(item) = item {
                        value = atr.next(&item);
                    }
                }
                snapshot.atr = Decimal::from_f64(value);
            }
        }

        if len >= self.volume_ma_period {
            if let Ok(mut sma) = SimpleMovingAverage::new(self.volume_ma_period) {
                let mut value = f64::NAN;
                for candle in candles {
                    value = sma.next(candle.volume.to_f64().unwrap_or(0.0));
                }
                snapshot.volume_ma = Decimal::from_f64(value);
            }
        }

        snapshot
    }

    /// Higher-timeframe trend: last close versus an EMA of `window` bars.
    pub fn trend_direction(&self, candles: &[Candle], window: usize) -> TrendDirection {
        if candles.len() < window {
            return TrendDirection::Unknown;
        }

        let Ok(mut ema) = ExponentialMovingAverage::new(window) else {
            return TrendDirection::Unknown;
        };

        let mut ema_value = f64::NAN;
        let mut last_close = f64::NAN;
        for candle in candles {
            let Some(close) = candle.close.to_f64() else {
                return TrendDirection::Unknown;
            };
            last_close = close;
            ema_value = ema.next(close);
        }

        if last_close > ema_value {
            TrendDirection::Up
        } else if last_close < ema_value {
            TrendDirection::Down
        } else {
            TrendDirection::Unknown
        }
    }
}
