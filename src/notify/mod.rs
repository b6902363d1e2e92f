//! Outbound trade notifications.

mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;

/// Fire-and-forget notification sink.
///
/// Implementations must swallow their own failures (log only): the trading
/// loop never blocks on, or reacts to, a notification outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Sink used when no notification channel is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _text: &str) {}
}
