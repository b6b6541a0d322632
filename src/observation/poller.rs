//! Generic tickered poller. Each poller fetches independently under
//! its own interval; a slow or failing poller never blocks its
//! siblings or the aggregator.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

use crate::error::Error;
use crate::observation::aggregator::ResourceUpdate;

/// Runs one named poller until `cancel` is set. Fetches immediately,
/// then on every subsequent tick of `tick_interval`. `fetch` returns
/// `None` when the underlying call was cancelled; that result is
/// suppressed, not delivered. Otherwise the update is delivered
/// non-blockingly (`try_send`); a full channel drops the current update
/// rather than stalling the poller.
pub async fn run_poller<F, Fut>(
    tick_interval: Duration,
    cancel: Arc<AtomicBool>,
    sender: mpsc::Sender<ResourceUpdate>,
    mut fetch: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<ResourceUpdate>>,
{
    if cancel.load(Ordering::Relaxed) {
        return;
    }
    if let Some(update) = fetch().await {
        let _ = sender.try_send(update);
    }

    let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
    loop {
        ticker.tick().await;
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        if let Some(update) = fetch().await {
            let _ = sender.try_send(update);
        }
    }
}

/// Runs `op`, suppressing cancellation so the caller can skip delivery:
/// context-cancellation errors are swallowed rather than reported.
/// `Ok(None)` means cancelled; `Ok(Some(_))` a real result; `Err(_)` a
/// real failure the caller should wrap and deliver.
pub async fn fetch_suppressing_cancel<Fut, T>(op: Fut) -> Result<Option<T>, String>
where
    Fut: Future<Output = crate::error::Result<T>>,
{
    match op.await {
        Ok(value) => Ok(Some(value)),
        Err(Error::Cancelled(_)) => Ok(None),
        Err(err) => Err(err.to_string()),
    }
}
