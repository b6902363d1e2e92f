//! Order sizing: notional target computation, step quantization and the
//! per-attempt shrink logic used by the open retry loop.

use rust_decimal::Decimal;

use crate::models::InstrumentLimits;

use super::TradeConfig;

/// Result of preparing one placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizedAttempt {
    /// Quantity to send with this attempt
    Order(Decimal),

    /// Quantized quantity fell below the instrument minimum; the open is
    /// economically too small and must be abandoned without further retries
    TooSmall(Decimal),
}

/// Floor `qty` to the instrument's step grid. Never rounds up: the result
/// must not exceed what the available margin was sized for.
pub fn quantize(qty: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return qty;
    }
    (qty / step).floor() * step
}

/// Initial notional target for a fresh open attempt.
pub fn initial_notional(safe_balance: Decimal, config: &TradeConfig) -> Decimal {
    safe_balance * config.balance_allocation * config.leverage
}

/// Prepare one attempt from the current notional target.
///
/// Applies, in order: the defensive margin re-check (shrink by
/// `reduce_step` when required margin exceeds the safe balance), the
/// commission deduction, and the floor quantization. This shrink trigger is
/// independent of the placement-failure shrink applied between attempts.
pub fn size_attempt(
    target: Decimal,
    safe_balance: Decimal,
    limits: &InstrumentLimits,
    config: &TradeConfig,
) -> SizedAttempt {
    let mut target = target;

    if target / config.leverage > safe_balance {
        target *= config.reduce_step;
    }

    target -= target * config.commission_rate;

    let qty = quantize(target, limits.step_size);
    if qty < limits.min_qty {
        return SizedAttempt::TooSmall(qty);
    }

    SizedAttempt::Order(qty)
}
