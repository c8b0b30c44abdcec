//! Bounded recovery queue and its single drain worker.
//!
//! Operations that fail while recovery is already in progress are parked
//! here instead of retrying inline, so N concurrent callers do not each
//! hammer a presumed-down dependency. The drain worker dispatches each entry
//! exactly once; it never retries on the caller's behalf.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::clock::Clock;
use super::errors::ResilienceError;
use super::manager::{AvailabilityState, Operation, Shared};

/// An operation parked while recovery is in progress.
///
/// The queue owns the entry until one terminal event occurs: its result is
/// delivered, its caller cancels, or it times out in the queue. The oneshot
/// sender guarantees at most one terminal write.
pub(crate) struct QueuedOperation {
    pub(crate) operation: Operation,
    pub(crate) result_tx: oneshot::Sender<Result<(), ResilienceError>>,
    pub(crate) caller: CancellationToken,
    pub(crate) enqueued_at: Instant,
}

/// Background drain loop; runs for the manager's lifetime.
///
/// Entries whose caller already cancelled are acknowledged without being
/// invoked. Entries dequeued while the dependency is not healthy receive
/// `NotHealthy` without being invoked. Send failures are ignored: the waiter
/// has already timed out or cancelled, and the at-most-one delivery rule
/// makes a second write impossible.
pub(crate) async fn drain_loop<C: Clock>(
    shared: Arc<Shared<C>>,
    mut queue_rx: mpsc::Receiver<QueuedOperation>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("queue drain worker stopping");
                break;
            }
            entry = queue_rx.recv() => {
                let Some(entry) = entry else { break };
                shared.metrics.record_dequeue();
                let residency = shared.clock.now().duration_since(entry.enqueued_at);
                debug!(residency_ms = residency.as_millis() as u64, "dequeued operation");

                if entry.caller.is_cancelled() {
                    let _ = entry.result_tx.send(Err(ResilienceError::Cancelled));
                    continue;
                }

                let result = if shared.state() == AvailabilityState::Healthy {
                    shared.run_cancellable(&entry.caller, &entry.operation).await
                } else {
                    debug!("dequeued operation while dependency unhealthy");
                    Err(ResilienceError::NotHealthy)
                };

                let _ = entry.result_tx.send(result);
            }
        }
    }
}
