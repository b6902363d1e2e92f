//! Bot runner: the sequential trading loop.
//!
//! One cycle = evaluate every instrument for entry (with pacing between
//! them), sweep all tracked positions for exits, then sync against the
//! exchange's position list. Nothing runs concurrently: order placement
//! against a shared balance must be strictly serialized, and the sizer
//! re-reads the balance right before every decision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::api::ExchangeGateway;
use crate::notify::Notifier;
use crate::trading::{LifecycleManager, TradeConfig};

/// Drives the lifecycle manager over the instrument universe until a
/// shutdown signal arrives.
pub struct Bot {
    config: TradeConfig,
    manager: LifecycleManager,
    notifier: Arc<dyn Notifier>,
    shutdown: Arc<AtomicBool>,
}

impl Bot {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        config: TradeConfig,
    ) -> Self {
        let manager = LifecycleManager::new(gateway, notifier.clone(), config.clone());

        Self {
            config,
            manager,
            notifier,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            symbols = self.config.symbols.len(),
            max_positions = self.config.max_positions,
            "starting trading loop"
        );

        // One-shot sync strictly before the first cycle: adopt whatever the
        // exchange already holds for this account.
        if let Err(e) = self.manager.reconcile().await {
            error!(error = %e, "startup reconciliation failed");
        }

        self.notifier.notify("🚀 Bot started").await;

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.cycle().await {
                // A bad cycle self-heals after a cooldown instead of
                // killing the process.
                error!(error = %e, "cycle failed, cooling down");
                sleep(Duration::from_secs(self.config.error_cooldown_secs)).await;
            }

            sleep(Duration::from_secs(self.config.cycle_delay_secs)).await;
        }

        info!("trading loop stopped");
        Ok(())
    }

    /// Single iteration of the loop.
    async fn cycle(&mut self) -> Result<()> {
        let symbols = self.config.symbols.clone();
        for symbol in &symbols {
            if let Err(e) = self.manager.try_open(symbol).await {
                warn!(symbol = %symbol, error = %e, "open evaluation failed");
            }
            sleep(Duration::from_secs(self.config.symbol_pacing_secs)).await;
        }

        self.manager.manage_positions().await;

        if let Err(e) = self.manager.reconcile().await {
            warn!(error = %e, "position sync failed");
        }

        debug!(open = self.manager.open_positions(), "cycle complete");
        Ok(())
    }
}
