//! Account balance model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wallet balance snapshot from the exchange.
///
/// Fetched fresh before every sizing decision; never cached across cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Total wallet balance in the settlement currency
    pub total: Decimal,

    /// Balance available for new margin
    pub available: Decimal,

    /// Margin currently committed to open positions
    pub used_margin: Decimal,
}

impl AccountBalance {
    /// Available balance minus a reserved buffer, floored at zero.
    ///
    /// This is the sizing base; the reserve keeps a small cushion so fees
    /// and rounding cannot push the account over its margin.
    pub fn safe_balance(&self, reserve_percent: Decimal) -> Decimal {
        (self.available - self.available * reserve_percent).max(Decimal::ZERO)
    }
}
