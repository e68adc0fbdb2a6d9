//! Synchronization context configuration.

use std::time::Duration;

/// Default pause between sign-out and sign-in during an account switch.
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Per-context settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pause after the sign-out half of an account switch, letting the
    /// DataBackend finish tearing down the old session.
    pub settle_delay: Duration,
    /// Bounded retry for recoverable sign-in failures. `None` keeps retries
    /// purely trigger-driven.
    pub retry: Option<RetryConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            retry: None,
        }
    }
}

/// Exponential backoff for opt-in sign-in retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of scheduled retries before waiting for a trigger.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
