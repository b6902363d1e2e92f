//! Exchange gateway: the capability the trading core consumes, plus the
//! Bybit V5 implementation.

mod bybit_client;
mod error;
mod types;

pub use bybit_client::BybitClient;
pub use error::GatewayError;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{AccountBalance, Candle, InstrumentLimits, OrderSide, Side};

/// A position slot as the exchange reports it.
///
/// The exchange keeps reporting a slot with zero size (and no side) right
/// after a position closes; reconciliation depends on seeing those rows.
#[derive(Debug, Clone)]
pub struct ExchangePosition {
    pub symbol: String,

    /// `None` for a flat slot (the exchange reports side "None")
    pub side: Option<Side>,

    pub size: Decimal,
    pub entry_price: Decimal,

    /// `None` when the exchange reports no resting stop for the position
    pub stop_loss: Option<Decimal>,
}

/// Acknowledgement for an order the exchange accepted.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
}

/// Synchronous request/response surface against the exchange. Every call is
/// a single network round-trip with a client-side timeout; callers treat
/// failures per the transient/rejection taxonomy in [`GatewayError`].
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Current wallet balance for the unified account.
    async fn get_balance(&self) -> Result<AccountBalance, GatewayError>;

    /// Lot-size limits for one instrument.
    async fn get_instrument_limits(&self, symbol: &str)
        -> Result<InstrumentLimits, GatewayError>;

    /// OHLCV bars for `symbol`, ordered oldest-first.
    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Last traded price.
    async fn get_last_price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    /// All open positions in the settlement currency's linear category.
    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, GatewayError>;

    /// Place a market order. `reduce_only` orders can only shrink an
    /// existing position.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck, GatewayError>;

    /// Register a resting stop-loss for an open position.
    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: Side,
        stop_price: Decimal,
    ) -> Result<(), GatewayError>;
}
