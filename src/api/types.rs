//! Wire types for the Bybit V5 REST API.
//!
//! Bybit encodes all numeric fields as strings; conversion to `Decimal`
//! happens in the client so parse failures surface as gateway errors.

use serde::Deserialize;

/// Every V5 response wraps its payload in this envelope. A non-zero
/// `retCode` is a rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub ret_code: i64,

    #[serde(default)]
    pub ret_msg: String,

    pub result: Option<T>,
}

/// Result of `/v5/account/wallet-balance`.
#[derive(Debug, Deserialize)]
pub struct WalletBalanceResult {
    pub list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    #[serde(default)]
    pub total_wallet_balance: String,

    #[serde(default)]
    pub available_balance: String,

    #[serde(default)]
    pub used_margin: String,
}

/// Result of `/v5/market/instruments-info`.
#[derive(Debug, Deserialize)]
pub struct InstrumentsResult {
    pub list: Vec<InstrumentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentEntry {
    #[serde(default)]
    pub symbol: String,

    pub lot_size_filter: LotSizeFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotSizeFilter {
    pub min_order_qty: String,
    pub qty_step: String,
}

/// Result of `/v5/market/kline`. Each entry is
/// `[startTime, open, high, low, close, volume, turnover]`, newest first.
#[derive(Debug, Deserialize)]
pub struct KlineResult {
    pub list: Vec<Vec<String>>,
}

/// Result of `/v5/market/tickers`.
#[derive(Debug, Deserialize)]
pub struct TickersResult {
    pub list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerEntry {
    #[serde(default)]
    pub symbol: String,

    pub last_price: String,
}

/// Result of `/v5/position/list`.
#[derive(Debug, Deserialize)]
pub struct PositionListResult {
    pub list: Vec<PositionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEntry {
    pub symbol: String,

    /// "Buy", "Sell", or "None" for an empty slot
    #[serde(default)]
    pub side: String,

    #[serde(default)]
    pub size: String,

    #[serde(default)]
    pub avg_price: String,

    /// Empty string or "0" when no stop is set
    #[serde(default)]
    pub stop_loss: String,
}

/// Result of `/v5/order/create`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreateResult {
    pub order_id: String,

    #[serde(default)]
    pub order_link_id: String,
}
