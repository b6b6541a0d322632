//! Generic retry combinator wrapping idempotent cluster API calls with
//! capped exponential backoff.

use std::time::Duration;

use tokio::time::sleep;

use crate::error::{Error, RetryKind};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Signals whether a caller's context was cancelled between attempts.
/// The orchestrator threads a `tokio_util::sync::CancellationToken`-like
/// handle through every suspension point; this crate models it as a
/// plain async closure so call sites don't need a specific cancellation
/// library wired in.
#[async_trait::async_trait]
pub trait CancelSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
    /// Cause to wrap a cancellation error with, if cancelled.
    fn cause(&self) -> String {
        "context cancelled".to_string()
    }
}

/// A signal that never cancels, for call sites with no cancellation handle.
pub struct NeverCancel;

#[async_trait::async_trait]
impl CancelSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Runs `op` under `policy`, retrying retryable failures with capped
/// exponential backoff. `op` is re-invoked from scratch on each attempt
/// (idempotent calls only). Cancellation observed between attempts
/// short-circuits to a terminal `Error::Cancelled` wrapping the cancel
/// cause.
pub async fn with_retry<F, Fut, T>(
    policy: RetryPolicy,
    cancel: &dyn CancelSignal,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(cancel.cause()));
        }

        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let terminal_due_to_cancel = matches!(err, Error::Cancelled(_));
                if terminal_due_to_cancel {
                    return Err(err);
                }
                if err.retry_kind() == RetryKind::Terminal {
                    return Err(err);
                }
                if attempt > policy.max_retries {
                    return Err(err);
                }

                if cancel.is_cancelled() {
                    return Err(Error::Cancelled(cancel.cause()));
                }

                let wait = err.retry_after().unwrap_or(backoff);
                sleep(wait).await;

                backoff = scale_backoff(backoff, policy.multiplier, policy.max_backoff);
            }
        }
    }
}

fn scale_backoff(current: Duration, multiplier: f64, cap: Duration) -> Duration {
    let scaled_secs = current.as_secs_f64() * multiplier;
    let capped = scaled_secs.min(cap.as_secs_f64());
    Duration::from_secs_f64(capped)
}
