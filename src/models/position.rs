//! Position model and the book of currently tracked positions.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::Side;

/// An open position tracked by the lifecycle manager.
///
/// One per symbol. Created on a filled entry order or adopted from the
/// exchange during reconciliation; mutated in place by partial closes and
/// extreme-price tracking; dropped from the book on full close or when the
/// exchange reports the position gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub qty: Decimal,

    /// Protective stop registered with the exchange
    pub stop_loss: Decimal,

    /// Price observed on the previous management cycle, for reversal detection
    pub prev_price: Decimal,

    /// Highest price seen while Long, lowest while Short
    pub extreme_price: Decimal,

    /// Whether the one-shot partial take-profit has already fired
    pub partial_tp_done: bool,
}

impl Position {
    /// Create a freshly opened position. Extreme and previous price start
    /// at the entry fill.
    pub fn new(
        symbol: String,
        side: Side,
        entry_price: Decimal,
        qty: Decimal,
        stop_loss: Decimal,
    ) -> Self {
        Self {
            symbol,
            side,
            entry_price,
            qty,
            stop_loss,
            prev_price: entry_price,
            extreme_price: entry_price,
            partial_tp_done: false,
        }
    }

    /// Unrealized profit as a percentage of entry, signed.
    pub fn profit_pct(&self, current_price: Decimal) -> Decimal {
        match self.side {
            Side::Long => {
                if self.entry_price.is_zero() {
                    return Decimal::ZERO;
                }
                (current_price / self.entry_price - Decimal::ONE) * dec!(100)
            }
            Side::Short => {
                if current_price.is_zero() {
                    return Decimal::ZERO;
                }
                (self.entry_price / current_price - Decimal::ONE) * dec!(100)
            }
        }
    }

    /// True when the current price has crossed the protective stop.
    pub fn stop_breached(&self, current_price: Decimal) -> bool {
        match self.side {
            Side::Long => current_price <= self.stop_loss,
            Side::Short => current_price >= self.stop_loss,
        }
    }

    /// Record a new favorable extreme. Returns true if the extreme moved.
    pub fn track_extreme(&mut self, current_price: Decimal) -> bool {
        let improved = match self.side {
            Side::Long => current_price > self.extreme_price,
            Side::Short => current_price < self.extreme_price,
        };
        if improved {
            self.extreme_price = current_price;
        }
        improved
    }

    /// True when price has retraced from the previous cycle's price by more
    /// than `drop` in the adverse direction.
    pub fn reversal_drop(&self, current_price: Decimal, drop: Decimal) -> bool {
        match self.side {
            Side::Long => current_price < self.prev_price * (Decimal::ONE - drop),
            Side::Short => current_price > self.prev_price * (Decimal::ONE + drop),
        }
    }

    /// P&L in settlement currency if the remaining quantity exits at `exit_price`.
    pub fn realized_pnl(&self, exit_price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (exit_price - self.entry_price) * self.qty,
            Side::Short => (self.entry_price - exit_price) * self.qty,
        }
    }
}

/// The set of positions the bot currently manages, keyed by symbol.
///
/// Single-owner: only the lifecycle manager mutates it. Admission control
/// lives here so the one-position-per-symbol and max-count invariants
/// cannot be bypassed.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<String, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Whether a new position for `symbol` may be opened under the
    /// concurrent-position bound.
    pub fn can_admit(&self, symbol: &str, max_positions: usize) -> bool {
        !self.contains(symbol) && self.len() < max_positions
    }

    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    pub fn remove(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    /// Symbols currently tracked, cloned so the caller can mutate the book
    /// while iterating.
    pub fn symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }
}
