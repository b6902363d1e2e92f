//! Trading core: configuration, signal evaluation, order sizing, stop
//! policy and the position lifecycle manager.

mod config;
mod lifecycle;
mod signal;
mod sizer;
mod stops;

pub use config::TradeConfig;
pub use lifecycle::LifecycleManager;
pub use signal::{EntrySignal, SignalEvaluator};
pub use sizer::{initial_notional, quantize, size_attempt, SizedAttempt};
pub use stops::initial_stop;
