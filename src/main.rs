//! Bybit linear-perpetuals momentum bot.
//!
//! Evaluates multi-indicator entry signals per instrument, sizes orders
//! against the account balance under leverage and fee constraints, and
//! manages every open position through stop-loss, partial take-profit and
//! reversal exits.

mod api;
mod bot;
mod indicators;
mod models;
mod notify;
mod trading;

use std::env;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::api::{BybitClient, ExchangeGateway};
use crate::bot::Bot;
use crate::notify::{NoopNotifier, Notifier, TelegramNotifier};
use crate::trading::TradeConfig;

/// Momentum trading bot CLI.
#[derive(Parser)]
#[command(name = "perpbot")]
#[command(about = "Momentum trading bot for Bybit linear perpetuals", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Use the exchange testnet
    #[arg(long)]
    testnet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading loop
    Run {
        /// Comma-separated symbol universe override
        #[arg(short, long, env = "BOT_SYMBOLS", value_delimiter = ',')]
        symbols: Option<Vec<String>>,

        /// Maximum number of concurrent positions
        #[arg(long)]
        max_positions: Option<usize>,
    },

    /// Show the account balance
    Balance,

    /// List exchange-reported open positions
    Positions,

    /// Show lot-size limits for a symbol
    Limits {
        /// Instrument symbol, e.g. BTCUSDT
        symbol: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging: console plus the append-only trade log file
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let file_appender = tracing_appender::rolling::never(".", "trade_log.txt");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let api_key = env::var("BYBIT_API_KEY").unwrap_or_default();
    let api_secret = env::var("BYBIT_API_SECRET").unwrap_or_default();
    let gateway = Arc::new(BybitClient::new(api_key, api_secret, cli.testnet)?);

    match cli.command {
        Commands::Run {
            symbols,
            max_positions,
        } => {
            let mut config = TradeConfig::default();
            if let Some(symbols) = symbols {
                config.symbols = symbols;
            }
            if let Some(max_positions) = max_positions {
                config.max_positions = max_positions;
            }

            let notifier = build_notifier();
            let mut bot = Bot::new(gateway, notifier, config);
            bot.run().await?;
        }

        Commands::Balance => {
            let balance = gateway.get_balance().await?;
            let config = TradeConfig::default();

            println!("Total:        {} USDT", balance.total);
            println!("Available:    {} USDT", balance.available);
            println!("Used margin:  {} USDT", balance.used_margin);
            println!(
                "Sizing base:  {} USDT",
                balance.safe_balance(config.reserve_percent)
            );
        }

        Commands::Positions => {
            let positions = gateway.get_open_positions().await?;
            let open: Vec<_> = positions
                .iter()
                .filter(|p| p.size > Decimal::ZERO)
                .collect();

            if open.is_empty() {
                println!("No open positions.");
                return Ok(());
            }

            println!(
                "{:<12} {:<6} {:>14} {:>14} {:>14}",
                "SYMBOL", "SIDE", "SIZE", "ENTRY", "STOP"
            );
            println!("{}", "-".repeat(64));

            for position in open {
                let side = position
                    .side
                    .map(|s| format!("{s:?}"))
                    .unwrap_or_else(|| "-".to_string());
                let stop = position
                    .stop_loss
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<12} {:<6} {:>14} {:>14} {:>14}",
                    position.symbol,
                    side,
                    position.size.to_string(),
                    position.entry_price.to_string(),
                    stop
                );
            }
        }

        Commands::Limits { symbol } => {
            let limits = gateway.get_instrument_limits(&symbol).await?;
            println!("{symbol}");
            println!("  Min qty:   {}", limits.min_qty);
            println!("  Qty step:  {}", limits.step_size);
        }

        Commands::Config => {
            let config = TradeConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Build the notification sink from the environment. Missing credentials
/// disable notifications rather than failing startup.
fn build_notifier() -> Arc<dyn Notifier> {
    match (env::var("TELEGRAM_TOKEN"), env::var("TELEGRAM_CHAT_ID")) {
        (Ok(token), Ok(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
            match TelegramNotifier::new(token, chat_id) {
                Ok(notifier) => {
                    info!("Telegram notifications enabled");
                    Arc::new(notifier)
                }
                Err(e) => {
                    warn!(error = %e, "failed to build Telegram notifier, notifications disabled");
                    Arc::new(NoopNotifier)
                }
            }
        }
        _ => {
            info!("Telegram credentials not set, notifications disabled");
            Arc::new(NoopNotifier)
        }
    }
}
