//! Trading configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for sizing, stops and the position lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    /// Leverage multiplier applied to own funds
    pub leverage: Decimal,

    /// Fraction of the safe balance committed per position
    pub balance_allocation: Decimal,

    /// Fixed protective-stop distance as a fraction of entry price
    pub stop_loss_percent: Decimal,

    /// Maximum number of concurrent positions
    pub max_positions: usize,

    /// Fraction of available balance held back from sizing
    pub reserve_percent: Decimal,

    /// Taker commission rate subtracted from the notional target
    pub commission_rate: Decimal,

    /// Order placement attempts before abandoning an open
    pub max_retries: u32,

    /// Multiplier applied to the notional target on each shrink
    pub reduce_step: Decimal,

    /// Retrace fraction from the previous cycle's price that exits a
    /// profitable position
    pub reversal_drop: Decimal,

    /// ATR multiplier for the volatility-scaled stop candidate
    pub atr_stop_multiplier: Decimal,

    /// Unrealized profit fraction that triggers the partial take-profit
    pub tp_partial_level: Decimal,

    /// Fraction of the position closed by the partial take-profit
    pub tp_partial_size: Decimal,

    /// Entry-timeframe kline interval (exchange notation, minutes)
    pub entry_interval: String,

    /// Higher-timeframe kline interval for the trend filter
    pub higher_interval: String,

    /// EMA window for the higher-timeframe trend filter
    pub higher_ema_window: usize,

    /// Candles fetched per indicator evaluation
    pub candle_limit: u32,

    /// Pause between instruments inside one pass (seconds)
    pub symbol_pacing_secs: u64,

    /// Pause between full loop cycles (seconds)
    pub cycle_delay_secs: u64,

    /// Cooldown after a failed cycle (seconds)
    pub error_cooldown_secs: u64,

    /// Pause between order placement retries (seconds)
    pub retry_delay_secs: u64,

    /// Instrument universe evaluated each cycle
    pub symbols: Vec<String>,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            leverage: dec!(10),
            balance_allocation: dec!(0.5),    // half the safe balance per entry
            stop_loss_percent: dec!(0.03),    // 3% fixed stop
            max_positions: 10,
            reserve_percent: dec!(0.001),     // 0.1% buffer
            commission_rate: dec!(0.001),     // 0.1% taker fee
            max_retries: 3,
            reduce_step: dec!(0.9),           // shrink 10% per retry
            reversal_drop: dec!(0.005),       // 0.5% retrace exits
            atr_stop_multiplier: dec!(1.2),
            tp_partial_level: dec!(0.01),     // partial TP at +1%
            tp_partial_size: dec!(0.5),       // close half
            entry_interval: "1".to_string(),
            higher_interval: "5".to_string(),
            higher_ema_window: 50,
            candle_limit: 200,
            symbol_pacing_secs: 1,
            cycle_delay_secs: 5,
            error_cooldown_secs: 30,
            retry_delay_secs: 1,
            symbols: [
                "BTCUSDT", "ETHUSDT", "DOGEUSDT", "SOLUSDT", "XRPUSDT",
                "JUPUSDT", "AEROUSDT", "JTOUSDT", "CFXUSDT", "TAOUSDT",
                "RAREUSDT", "LEVERUSDT", "MBOXUSDT", "EIGENUSDT", "FLRUSDT",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}
