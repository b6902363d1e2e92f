//! Domain models: sides, candles, balances, instrument limits, positions.

mod account;
mod candle;
mod market;
mod position;
mod side;

pub use account::AccountBalance;
pub use candle::Candle;
pub use market::InstrumentLimits;
pub use position::{Position, PositionBook};
pub use side::{OrderSide, Side};
