//! Bybit V5 REST client with HMAC-SHA256 request signing.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use crate::models::{AccountBalance, Candle, InstrumentLimits, OrderSide, Side};

use super::types::*;
use super::{ExchangeGateway, ExchangePosition, GatewayError, OrderAck};

const MAINNET_URL: &str = "https://api.bybit.com";
const TESTNET_URL: &str = "https://api-testnet.bybit.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RECV_WINDOW: u64 = 5000;
const CATEGORY: &str = "linear";

type HmacSha256 = Hmac<Sha256>;

/// Authenticated client for Bybit's V5 unified-trading REST API.
pub struct BybitClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl BybitClient {
    /// Create a client against mainnet or testnet.
    pub fn new(api_key: String, api_secret: String, testnet: bool) -> Result<Self, GatewayError> {
        let base_url = if testnet { TESTNET_URL } else { MAINNET_URL };
        Self::with_base_url(api_key, api_secret, base_url.to_string())
    }

    /// Create with a custom base URL (for testing).
    pub fn with_base_url(
        api_key: String,
        api_secret: String,
        base_url: String,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_key,
            api_secret,
            base_url,
        })
    }

    /// Sign `timestamp + api_key + recv_window + payload` per the V5 scheme.
    fn sign(&self, timestamp: i64, payload: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| GatewayError::Malformed(format!("invalid API secret: {e}")))?;
        mac.update(format!("{timestamp}{}{RECV_WINDOW}{payload}", self.api_key).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!(url = %url, "GET");

        let envelope: ApiEnvelope<T> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        unwrap_result(envelope)
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, GatewayError> {
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.sign(timestamp, query)?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!(url = %url, "signed GET");

        let envelope: ApiEnvelope<T> = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-SIGN-TYPE", "2")
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW.to_string())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        unwrap_result(envelope)
    }

    async fn signed_post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, GatewayError> {
        let raw = body.to_string();
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.sign(timestamp, &raw)?;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, body = %raw, "signed POST");

        let envelope: ApiEnvelope<T> = self
            .client
            .post(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-SIGN-TYPE", "2")
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW.to_string())
            .header("Content-Type", "application/json")
            .body(raw)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        unwrap_result(envelope)
    }
}

#[async_trait]
impl ExchangeGateway for BybitClient {
    async fn get_balance(&self) -> Result<AccountBalance, GatewayError> {
        let result: WalletBalanceResult = self
            .signed_get("/v5/account/wallet-balance", "accountType=UNIFIED")
            .await?;

        let account = result
            .list
            .first()
            .ok_or_else(|| GatewayError::Malformed("empty wallet balance list".into()))?;

        let total = parse_dec_or_zero(&account.total_wallet_balance);
        // The exchange omits availableBalance on some account modes; fall
        // back to the total like the wallet UI does.
        let available = if account.available_balance.is_empty() {
            total
        } else {
            parse_dec_or_zero(&account.available_balance)
        };

        Ok(AccountBalance {
            total,
            available,
            used_margin: parse_dec_or_zero(&account.used_margin),
        })
    }

    async fn get_instrument_limits(
        &self,
        symbol: &str,
    ) -> Result<InstrumentLimits, GatewayError> {
        let query = format!("category={CATEGORY}&symbol={symbol}");
        let result: InstrumentsResult = self
            .public_get("/v5/market/instruments-info", &query)
            .await?;

        let entry = result
            .list
            .first()
            .ok_or_else(|| GatewayError::Malformed(format!("unknown instrument {symbol}")))?;

        let min_qty = parse_dec(&entry.lot_size_filter.min_order_qty, "minOrderQty")?;
        let step_size = parse_dec(&entry.lot_size_filter.qty_step, "qtyStep")?;
        if step_size <= Decimal::ZERO {
            return Err(GatewayError::Malformed(format!(
                "non-positive qtyStep for {symbol}"
            )));
        }

        Ok(InstrumentLimits { min_qty, step_size })
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let query =
            format!("category={CATEGORY}&symbol={symbol}&interval={interval}&limit={limit}");
        let result: KlineResult = self.public_get("/v5/market/kline", &query).await?;

        // Rows come newest-first; indicators want chronological order.
        let mut candles = Vec::with_capacity(result.list.len());
        for row in result.list.iter().rev() {
            if row.len() < 6 {
                return Err(GatewayError::Malformed("short kline row".into()));
            }
            let ms: i64 = row[0]
                .parse()
                .map_err(|_| GatewayError::Malformed(format!("bad kline timestamp {:?}", row[0])))?;
            let start_time = Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| GatewayError::Malformed(format!("bad kline timestamp {ms}")))?;

            candles.push(Candle {
                start_time,
                open: parse_dec(&row[1], "kline open")?,
                high: parse_dec(&row[2], "kline high")?,
                low: parse_dec(&row[3], "kline low")?,
                close: parse_dec(&row[4], "kline close")?,
                volume: parse_dec(&row[5], "kline volume")?,
            });
        }

        Ok(candles)
    }

    async fn get_last_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let query = format!("category={CATEGORY}&symbol={symbol}");
        let result: TickersResult = self.public_get("/v5/market/tickers", &query).await?;

        let ticker = result
            .list
            .first()
            .ok_or_else(|| GatewayError::Malformed(format!("no ticker for {symbol}")))?;

        parse_dec(&ticker.last_price, "lastPrice")
    }

    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, GatewayError> {
        let result: PositionListResult = self
            .signed_get(
                "/v5/position/list",
                &format!("category={CATEGORY}&settleCoin=USDT"),
            )
            .await?;

        let positions = result
            .list
            .into_iter()
            .map(|entry| {
                let stop = parse_dec_or_zero(&entry.stop_loss);
                ExchangePosition {
                    side: Side::from_exchange(&entry.side),
                    size: parse_dec_or_zero(&entry.size),
                    entry_price: parse_dec_or_zero(&entry.avg_price),
                    stop_loss: (stop > Decimal::ZERO).then_some(stop),
                    symbol: entry.symbol,
                }
            })
            .collect();

        Ok(positions)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck, GatewayError> {
        let body = serde_json::json!({
            "category": CATEGORY,
            "symbol": symbol,
            "side": side.as_str(),
            "orderType": "Market",
            "qty": qty.to_string(),
            "reduceOnly": reduce_only,
            "orderLinkId": Uuid::new_v4().to_string(),
        });

        let result: OrderCreateResult = self.signed_post("/v5/order/create", &body).await?;

        Ok(OrderAck {
            order_id: result.order_id,
        })
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        _side: Side,
        stop_price: Decimal,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "category": CATEGORY,
            "symbol": symbol,
            "stopLoss": stop_price.to_string(),
            "positionIdx": 0,
        });

        // One-way mode: positionIdx 0 addresses the single slot per symbol.
        let _: serde_json::Value = self.signed_post("/v5/position/trading-stop", &body).await?;
        Ok(())
    }
}

fn unwrap_result<T>(envelope: ApiEnvelope<T>) -> Result<T, GatewayError> {
    if envelope.ret_code != 0 {
        return Err(GatewayError::Rejected {
            code: envelope.ret_code,
            message: envelope.ret_msg,
        });
    }
    envelope
        .result
        .ok_or_else(|| GatewayError::Malformed("envelope missing result".into()))
}

fn parse_dec(value: &str, field: &str) -> Result<Decimal, GatewayError> {
    Decimal::from_str(value)
        .map_err(|_| GatewayError::Malformed(format!("bad decimal in {field}: {value:?}")))
}

fn parse_dec_or_zero(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or(Decimal::ZERO)
}
