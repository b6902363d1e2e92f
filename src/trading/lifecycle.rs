//! Position lifecycle manager: opening, partial take-profit, trailing
//! checks, reversal exits and reconciliation against the exchange.

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::api::{ExchangeGateway, GatewayError};
use crate::indicators::IndicatorProvider;
use crate::models::{InstrumentLimits, Position, PositionBook, Side};
use crate::notify::Notifier;

use super::{
    initial_notional, initial_stop, quantize, size_attempt, SignalEvaluator, SizedAttempt,
    TradeConfig,
};

/// Owns the set of open positions and drives every state transition:
/// opening, partial take-profit, stop-loss and reversal exits, and
/// reconciliation against exchange-reported reality.
///
/// Nothing else mutates the position book.
pub struct LifecycleManager {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    config: TradeConfig,
    provider: IndicatorProvider,
    evaluator: SignalEvaluator,
    book: PositionBook,
}

impl LifecycleManager {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        config: TradeConfig,
    ) -> Self {
        Self {
            gateway,
            notifier,
            config,
            provider: IndicatorProvider::default(),
            evaluator: SignalEvaluator::default(),
            book: PositionBook::new(),
        }
    }

    /// Number of positions currently tracked.
    pub fn open_positions(&self) -> usize {
        self.book.len()
    }

    // ==================== Opening ====================

    /// Evaluate one instrument and open a position if an entry signal
    /// fires. A no-op when the symbol is already held or the book is full.
    pub async fn try_open(&mut self, symbol: &str) -> Result<()> {
        if !self.book.can_admit(symbol, self.config.max_positions) {
            return Ok(());
        }

        let balance = self.gateway.get_balance().await?;
        let safe_balance = balance.safe_balance(self.config.reserve_percent);
        let limits = self.gateway.get_instrument_limits(symbol).await?;

        let candles = self
            .gateway
            .get_candles(symbol, &self.config.entry_interval, self.config.candle_limit)
            .await?;
        let snapshot = self.provider.compute(&candles);

        let higher = self
            .gateway
            .get_candles(symbol, &self.config.higher_interval, self.config.candle_limit)
            .await?;
        let trend = self
            .provider
            .trend_direction(&higher, self.config.higher_ema_window);

        let Some(signal) = self.evaluator.evaluate(&snapshot, trend) else {
            return Ok(());
        };

        info!(symbol, signal = ?signal, "entry signal");
        self.place_entry(symbol, signal.side(), safe_balance, &limits, snapshot.atr)
            .await;
        Ok(())
    }

    /// Bounded retry-with-shrink placement loop: one order attempt per
    /// iteration, shrinking the notional target after each failure. A
    /// quantity below the instrument minimum abandons the open outright.
    async fn place_entry(
        &mut self,
        symbol: &str,
        side: Side,
        safe_balance: Decimal,
        limits: &InstrumentLimits,
        atr: Option<Decimal>,
    ) {
        let mut target = initial_notional(safe_balance, &self.config);

        for attempt in 1..=self.config.max_retries {
            let qty = match size_attempt(target, safe_balance, limits, &self.config) {
                SizedAttempt::Order(qty) => qty,
                SizedAttempt::TooSmall(qty) => {
                    debug!(
                        symbol,
                        %qty,
                        min_qty = %limits.min_qty,
                        "open abandoned: quantity below instrument minimum"
                    );
                    return;
                }
            };

            match self.attempt_entry(symbol, side, qty, atr).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(symbol, attempt, error = %e, "entry attempt failed");
                }
            }

            target = qty * self.config.reduce_step;
            sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
        }

        warn!(symbol, "open abandoned: retry budget exhausted");
    }

    /// One placement attempt: fetch the price, send the market order,
    /// register the stop and record the new position.
    async fn attempt_entry(
        &mut self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        atr: Option<Decimal>,
    ) -> Result<(), GatewayError> {
        let price = self.gateway.get_last_price(symbol).await?;
        self.gateway
            .place_market_order(symbol, side.entry_order(), qty, false)
            .await?;

        let stop = initial_stop(side, price, atr, &self.config);
        if let Err(e) = self.gateway.set_stop_loss(symbol, side, stop).await {
            // The fill is already live; keep the position and rely on the
            // software-side breach check until a stop can be registered.
            warn!(symbol, error = %e, "failed to register stop-loss");
        }

        info!(symbol, ?side, %qty, %price, %stop, "position opened");
        self.book
            .insert(Position::new(symbol.to_string(), side, price, qty, stop));

        let notional = qty * price;
        let own_funds = notional / self.config.leverage;
        let borrowed = notional - own_funds;
        self.notifier
            .notify(&format!(
                "✅ Opened {side:?} {symbol}\n\
                 Notional: {notional:.2} USDT\n\
                 Own funds: {own_funds:.2} USDT\n\
                 Borrowed: {borrowed:.2} USDT\n\
                 Entry: {price}\n\
                 Stop-loss: {stop}"
            ))
            .await;

        Ok(())
    }

    // ==================== Management sweep ====================

    /// Run the exit checks for every tracked position. One symbol's
    /// failure never aborts the sweep.
    pub async fn manage_positions(&mut self) {
        for symbol in self.book.symbols() {
            if let Err(e) = self.manage_one(&symbol).await {
                warn!(symbol = %symbol, error = %e, "position management failed");
            }
        }
    }

    /// Per-cycle checks for one position, in fixed order: stop-loss
    /// breach, partial take-profit, extreme tracking, reversal-drop exit,
    /// previous-price update.
    async fn manage_one(&mut self, symbol: &str) -> Result<(), GatewayError> {
        let Some(position) = self.book.get(symbol).cloned() else {
            return Ok(());
        };
        let price = self.gateway.get_last_price(symbol).await?;

        if position.stop_breached(price) {
            info!(symbol, %price, stop = %position.stop_loss, "stop-loss breached");
            self.full_close(symbol, price, "stop-loss hit").await?;
            return Ok(());
        }

        let profit_pct = position.profit_pct(price);

        if !position.partial_tp_done
            && profit_pct >= self.config.tp_partial_level * dec!(100)
        {
            if let Err(e) = self.partial_close(symbol).await {
                warn!(symbol, error = %e, "partial close failed");
            }
        }

        if let Some(position) = self.book.get_mut(symbol) {
            position.track_extreme(price);
        }

        if profit_pct > Decimal::ZERO && position.reversal_drop(price, self.config.reversal_drop)
        {
            info!(symbol, %price, prev = %position.prev_price, "reversal drop while in profit");
            self.full_close(symbol, price, "reversal drop").await?;
            return Ok(());
        }

        if let Some(position) = self.book.get_mut(symbol) {
            position.prev_price = price;
        }

        Ok(())
    }

    /// Close a configured fraction of the position with a reduce-only
    /// market order. The one-shot flag is set only after the order is
    /// accepted, so a transient failure retries next cycle while a success
    /// can never fire twice.
    async fn partial_close(&mut self, symbol: &str) -> Result<(), GatewayError> {
        let Some(position) = self.book.get(symbol).cloned() else {
            return Ok(());
        };

        let limits = self.gateway.get_instrument_limits(symbol).await?;
        let close_qty = quantize(position.qty * self.config.tp_partial_size, limits.step_size);
        if close_qty < limits.min_qty {
            debug!(symbol, %close_qty, "partial close skipped: below instrument minimum");
            return Ok(());
        }

        self.gateway
            .place_market_order(symbol, position.side.exit_order(), close_qty, true)
            .await?;

        if let Some(position) = self.book.get_mut(symbol) {
            position.qty -= close_qty;
            position.partial_tp_done = true;
        }

        info!(symbol, %close_qty, "partial take-profit executed");
        self.notifier
            .notify(&format!(
                "⚙ Partial close on {symbol}: {pct}% of the position",
                pct = self.config.tp_partial_size * dec!(100)
            ))
            .await;

        Ok(())
    }

    /// Close the remaining quantity with a reduce-only market order and
    /// drop the position from the book. On failure the position stays
    /// tracked and the next cycle retries.
    async fn full_close(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let Some(position) = self.book.get(symbol).cloned() else {
            return Ok(());
        };

        self.gateway
            .place_market_order(symbol, position.side.exit_order(), position.qty, true)
            .await?;

        let pnl = position.realized_pnl(exit_price);
        self.book.remove(symbol);
        info!(symbol, reason, %exit_price, %pnl, "position closed");

        let mut message = format!(
            "❎ Closed {symbol} ({reason})\n\
             Entry: {entry}\n\
             Exit: {exit_price}\n\
             P&L: {pnl:.4} USDT",
            entry = position.entry_price
        );
        if let Ok(balance) = self.gateway.get_balance().await {
            message.push_str(&format!("\nBalance: {:.2} USDT", balance.total));
        }
        self.notifier.notify(&message).await;

        Ok(())
    }

    // ==================== Reconciliation ====================

    /// Sync the book against the exchange's authoritative position list:
    /// adopt reported positions we are not tracking, and drop tracked
    /// positions whose exchange size has gone to zero (closed by the
    /// resting stop, liquidation or a manual close; no order is sent for
    /// those). Idempotent.
    pub async fn reconcile(&mut self) -> Result<()> {
        let reported = self.gateway.get_open_positions().await?;

        for entry in &reported {
            if entry.size > Decimal::ZERO && !self.book.contains(&entry.symbol) {
                let Some(side) = entry.side else {
                    continue;
                };
                let stop_loss = entry.stop_loss.unwrap_or(entry.entry_price);
                info!(
                    symbol = %entry.symbol,
                    ?side,
                    size = %entry.size,
                    "adopted exchange-reported position"
                );
                self.book.insert(Position::new(
                    entry.symbol.clone(),
                    side,
                    entry.entry_price,
                    entry.size,
                    stop_loss,
                ));
            }
        }

        for entry in &reported {
            if entry.size.is_zero() && self.book.contains(&entry.symbol) {
                self.book.remove(&entry.symbol);
                info!(symbol = %entry.symbol, "position closed externally");
                self.notifier
                    .notify(&format!(
                        "❎ {} closed on the exchange (stop or manual close)",
                        entry.symbol
                    ))
                    .await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::api::{ExchangePosition, OrderAck};
    use crate::models::{AccountBalance, Candle, OrderSide};
    use crate::notify::NoopNotifier;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct RecordedOrder {
        symbol: String,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    }

    struct MockGateway {
        balance: AccountBalance,
        limits: InstrumentLimits,
        prices: Mutex<HashMap<String, Decimal>>,
        reported: Mutex<Vec<ExchangePosition>>,
        orders: Mutex<Vec<RecordedOrder>>,
        stops: Mutex<Vec<(String, Decimal)>>,
        order_failures: AtomicU32,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                balance: AccountBalance {
                    total: dec!(1000),
                    available: dec!(1000),
                    used_margin: Decimal::ZERO,
                },
                limits: InstrumentLimits {
                    min_qty: dec!(0.01),
                    step_size: dec!(0.01),
                },
                prices: Mutex::new(HashMap::new()),
                reported: Mutex::new(Vec::new()),
                orders: Mutex::new(Vec::new()),
                stops: Mutex::new(Vec::new()),
                order_failures: AtomicU32::new(0),
            }
        }

        fn set_price(&self, symbol: &str, price: Decimal) {
            self.prices.lock().unwrap().insert(symbol.to_string(), price);
        }

        fn fail_next_orders(&self, count: u32) {
            self.order_failures.store(count, Ordering::SeqCst);
        }

        fn orders(&self) -> Vec<RecordedOrder> {
            self.orders.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExchangeGateway for MockGateway {
        async fn get_balance(&self) -> Result<AccountBalance, GatewayError> {
            Ok(self.balance.clone())
        }

        async fn get_instrument_limits(
            &self,
            _symbol: &str,
        ) -> Result<InstrumentLimits, GatewayError> {
            Ok(self.limits.clone())
        }

        async fn get_candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> Result<Vec<Candle>, GatewayError> {
            Ok(Vec::new())
        }

        async fn get_last_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
            self.prices
                .lock()
                .unwrap()
                .get(symbol)
                .copied()
                .ok_or_else(|| GatewayError::Malformed(format!("no price for {symbol}")))
        }

        async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, GatewayError> {
            Ok(self.reported.lock().unwrap().clone())
        }

        async fn place_market_order(
            &self,
            symbol: &str,
            side: OrderSide,
            qty: Decimal,
            reduce_only: bool,
        ) -> Result<OrderAck, GatewayError> {
            self.orders.lock().unwrap().push(RecordedOrder {
                symbol: symbol.to_string(),
                side,
                qty,
                reduce_only,
            });

            if self.order_failures.load(Ordering::SeqCst) > 0 {
                self.order_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(GatewayError::Rejected {
                    code: 110007,
                    message: "insufficient available balance".to_string(),
                });
            }

            Ok(OrderAck {
                order_id: "mock-order".to_string(),
            })
        }

        async fn set_stop_loss(
            &self,
            symbol: &str,
            _side: Side,
            stop_price: Decimal,
        ) -> Result<(), GatewayError> {
            self.stops
                .lock()
                .unwrap()
                .push((symbol.to_string(), stop_price));
            Ok(())
        }
    }

    fn manager_with(gateway: Arc<MockGateway>) -> LifecycleManager {
        let config = TradeConfig {
            retry_delay_secs: 0,
            ..TradeConfig::default()
        };
        LifecycleManager::new(gateway, Arc::new(NoopNotifier), config)
    }

    fn long_position(symbol: &str, entry: Decimal, qty: Decimal, stop: Decimal) -> Position {
        Position::new(symbol.to_string(), Side::Long, entry, qty, stop)
    }

    fn flat_slot(symbol: &str) -> ExchangePosition {
        ExchangePosition {
            symbol: symbol.to_string(),
            side: None,
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            stop_loss: None,
        }
    }

    #[tokio::test]
    async fn test_entry_retry_shrinks_after_rejection() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_price("BTCUSDT", dec!(10));
        gateway.fail_next_orders(1);

        let mut manager = manager_with(gateway.clone());
        let limits = InstrumentLimits {
            min_qty: dec!(0.01),
            step_size: dec!(0.01),
        };
        manager
            .place_entry("BTCUSDT", Side::Long, dec!(1000), &limits, Some(dec!(2)))
            .await;

        // First attempt 5000 -> 4995 after commission; second shrinks the
        // target by 0.9 and deducts commission again
        let orders = gateway.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].qty, dec!(4995.00));
        assert_eq!(orders[1].qty, dec!(4491.00));
        assert!(orders.iter().all(|o| !o.reduce_only));

        let position = manager.book.get("BTCUSDT").unwrap();
        assert_eq!(position.entry_price, dec!(10));
        assert_eq!(position.qty, dec!(4491.00));

        // ATR stop (10 - 2*1.2 = 7.6) beats the fixed 3% stop (9.7)
        assert_eq!(position.stop_loss, dec!(7.6));
        assert_eq!(gateway.stops.lock().unwrap()[0], ("BTCUSDT".to_string(), dec!(7.6)));
    }

    #[tokio::test]
    async fn test_entry_below_minimum_aborts_without_retries() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_price("BTCUSDT", dec!(10));

        let mut manager = manager_with(gateway.clone());
        let limits = InstrumentLimits {
            min_qty: dec!(100000),
            step_size: dec!(0.01),
        };
        manager
            .place_entry("BTCUSDT", Side::Long, dec!(1000), &limits, None)
            .await;

        assert!(gateway.orders().is_empty());
        assert_eq!(manager.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_abandons_open() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_price("BTCUSDT", dec!(10));
        gateway.fail_next_orders(10);

        let mut manager = manager_with(gateway.clone());
        let limits = InstrumentLimits {
            min_qty: dec!(0.01),
            step_size: dec!(0.01),
        };
        manager
            .place_entry("BTCUSDT", Side::Long, dec!(1000), &limits, None)
            .await;

        assert_eq!(gateway.orders().len(), 3); // max_retries attempts
        assert_eq!(manager.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_admission_control_blocks_duplicates_and_overflow() {
        let gateway = Arc::new(MockGateway::new());
        let mut manager = manager_with(gateway.clone());
        manager.config.max_positions = 1;
        manager
            .book
            .insert(long_position("BTCUSDT", dec!(100), dec!(1), dec!(97)));

        // Duplicate symbol and full book both no-op before touching the
        // gateway
        manager.try_open("BTCUSDT").await.unwrap();
        manager.try_open("ETHUSDT").await.unwrap();

        assert!(gateway.orders().is_empty());
        assert_eq!(manager.open_positions(), 1);
    }

    #[tokio::test]
    async fn test_stop_breach_closes_and_skips_other_checks() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_price("BTCUSDT", dec!(97));

        let mut manager = manager_with(gateway.clone());
        manager
            .book
            .insert(long_position("BTCUSDT", dec!(100), dec!(2), dec!(97)));

        manager.manage_positions().await;

        let orders = gateway.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_eq!(orders[0].qty, dec!(2));
        assert!(orders[0].reduce_only);
        assert_eq!(manager.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_partial_take_profit_fires_once() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_price("BTCUSDT", dec!(101.5));

        let mut manager = manager_with(gateway.clone());
        manager
            .book
            .insert(long_position("BTCUSDT", dec!(100), dec!(2), dec!(97)));

        manager.manage_positions().await;

        let orders = gateway.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].qty, dec!(1.00)); // half of 2
        assert!(orders[0].reduce_only);

        let position = manager.book.get("BTCUSDT").unwrap();
        assert!(position.partial_tp_done);
        assert_eq!(position.qty, dec!(1.00));
        assert_eq!(position.prev_price, dec!(101.5));

        // Same price next cycle: no second partial, no other exits
        manager.manage_positions().await;
        assert_eq!(gateway.orders().len(), 1);
        assert_eq!(manager.open_positions(), 1);
    }

    #[tokio::test]
    async fn test_reversal_exit_requires_positive_profit() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_price("BTCUSDT", dec!(99));

        let mut manager = manager_with(gateway.clone());
        manager
            .book
            .insert(long_position("BTCUSDT", dec!(100), dec!(2), dec!(90)));

        // 1% drop from prev_price 100 exceeds the 0.5% threshold, but the
        // position is under water: no exit
        manager.manage_positions().await;

        assert!(gateway.orders().is_empty());
        let position = manager.book.get("BTCUSDT").unwrap();
        assert_eq!(position.prev_price, dec!(99));
    }

    #[tokio::test]
    async fn test_reversal_exit_fires_in_profit() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_price("BTCUSDT", dec!(105));

        let mut manager = manager_with(gateway.clone());
        let mut position = long_position("BTCUSDT", dec!(100), dec!(2), dec!(90));
        position.partial_tp_done = true;
        position.prev_price = dec!(110);
        manager.book.insert(position);

        // +5% from entry, but 4.5% below the previous cycle's price
        manager.manage_positions().await;

        let orders = gateway.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].qty, dec!(2));
        assert!(orders[0].reduce_only);
        assert_eq!(manager.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_external_close_removes_without_order() {
        let gateway = Arc::new(MockGateway::new());
        let mut manager = manager_with(gateway.clone());
        manager
            .book
            .insert(long_position("BTCUSDT", dec!(100), dec!(2), dec!(97)));

        *gateway.reported.lock().unwrap() = vec![flat_slot("BTCUSDT")];

        manager.reconcile().await.unwrap();

        assert_eq!(manager.open_positions(), 0);
        assert!(gateway.orders().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_adopts_and_is_idempotent() {
        let gateway = Arc::new(MockGateway::new());
        *gateway.reported.lock().unwrap() = vec![ExchangePosition {
            symbol: "ETHUSDT".to_string(),
            side: Some(Side::Long),
            size: dec!(3),
            entry_price: dec!(2000),
            stop_loss: None,
        }];

        let mut manager = manager_with(gateway.clone());
        manager.reconcile().await.unwrap();

        let position = manager.book.get("ETHUSDT").unwrap().clone();
        assert_eq!(position.qty, dec!(3));
        // Stop defaults to entry when the exchange reports none
        assert_eq!(position.stop_loss, dec!(2000));
        assert_eq!(position.extreme_price, dec!(2000));

        // A second pass with unchanged exchange state mutates nothing
        manager.reconcile().await.unwrap();
        assert_eq!(manager.open_positions(), 1);
        let unchanged = manager.book.get("ETHUSDT").unwrap();
        assert_eq!(unchanged.qty, position.qty);
        assert_eq!(unchanged.stop_loss, position.stop_loss);
        assert_eq!(unchanged.prev_price, position.prev_price);
        assert!(gateway.orders().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_preserves_reported_stop() {
        let gateway = Arc::new(MockGateway::new());
        *gateway.reported.lock().unwrap() = vec![ExchangePosition {
            symbol: "ETHUSDT".to_string(),
            side: Some(Side::Short),
            size: dec!(1),
            entry_price: dec!(2000),
            stop_loss: Some(dec!(2060)),
        }];

        let mut manager = manager_with(gateway.clone());
        manager.reconcile().await.unwrap();

        let position = manager.book.get("ETHUSDT").unwrap();
        assert_eq!(position.side, Side::Short);
        assert_eq!(position.stop_loss, dec!(2060));
    }

    #[tokio::test]
    async fn test_price_failure_isolated_per_symbol() {
        let gateway = Arc::new(MockGateway::new());
        // Price only for ETHUSDT; BTCUSDT's fetch fails
        gateway.set_price("ETHUSDT", dec!(1900));

        let mut manager = manager_with(gateway.clone());
        manager
            .book
            .insert(long_position("BTCUSDT", dec!(100), dec!(2), dec!(97)));
        manager
            .book
            .insert(long_position("ETHUSDT", dec!(2000), dec!(1), dec!(1950)));

        // The sweep survives the failing symbol and still closes the other
        // one on its breached stop
        manager.manage_positions().await;

        let orders = gateway.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].symbol, "ETHUSDT");
        assert_eq!(manager.open_positions(), 1);
    }
}
