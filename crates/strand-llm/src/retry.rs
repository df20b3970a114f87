//! Flat-delay retry for provider call establishment.
//!
//! Only call *establishment* is retried: once a raw stream has been handed
//! to the caller, a mid-stream failure surfaces through the stream itself.
//! Only connection-class errors are eligible — an auth failure or API
//! rejection will not get better by asking again.

use std::future::Future;

use strand_core::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::provider::{ProviderError, RawEventStream};

/// Errors from the retry wrapper.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// The call failed with an error that is not retried.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Every attempt failed with a connection error.
    ///
    /// Distinct from [`RetryError::Provider`] so callers can tell "the
    /// provider said no" apart from "we could never reach the provider".
    #[error("retries exhausted after {attempts} attempts: {last}")]
    MaxRetriesReached {
        /// How many attempts were made.
        attempts: u32,
        /// The final connection error.
        #[source]
        last: ProviderError,
    },

    /// Cancelled while waiting between attempts.
    #[error("retry cancelled")]
    Cancelled,
}

/// Call `factory` until it succeeds, a non-connection error occurs, or the
/// policy's attempt budget runs out.
///
/// The delay between attempts is the policy's flat `delay_ms`; the wait is
/// cancellable through `cancel`.
pub async fn retry_call<F, Fut>(
    mut factory: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RawEventStream, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawEventStream, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match factory().await {
            Ok(stream) => return Ok(stream),
            Err(err) if !err.is_connection() => return Err(RetryError::Provider(err)),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryError::MaxRetriesReached {
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = policy.delay_ms,
                    error = %err,
                    "provider call failed, retrying"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(RetryError::Cancelled),
                    () = tokio::time::sleep(policy.delay()) => {}
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
