//! Retry policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Policy for retrying provider calls that fail with connection errors.
///
/// The delay between attempts is flat, not exponential: transient network
/// failures either clear quickly or not at all, and a predictable worst-case
/// wall time (`max_attempts * delay_ms`) matters more here than politeness
/// curves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_delay_ms() -> u64 {
    3000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay between attempts as a [`Duration`].
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
