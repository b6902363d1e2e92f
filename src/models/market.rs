//! Instrument trading limits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lot-size constraints for one instrument.
///
/// Fetched once per open attempt and treated as immutable for the session.
/// `step_size` is always positive; the gateway rejects instrument payloads
/// that report a zero step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentLimits {
    /// Smallest order quantity the exchange accepts
    pub min_qty: Decimal,

    /// Quantity grid: orders must be an integer multiple of this
    pub step_size: Decimal,
}
