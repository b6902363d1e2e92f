//! Gateway error taxonomy.

use thiserror::Error;

/// Failures from the exchange gateway.
///
/// `Transport` and `Malformed` are transient: the operation is abandoned for
/// the current cycle and retried naturally on the next one. `Rejected` means
/// the exchange understood the request and declined it (insufficient margin,
/// bad quantity, rate limit); the sizing retry loop shrinks and retries on
/// it, everything else logs and moves on.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("malformed exchange payload: {0}")]
    Malformed(String),
}
