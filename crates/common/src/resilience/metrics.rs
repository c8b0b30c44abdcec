//! Atomic operation counters and their read-only snapshot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shared counters updated on every managed operation.
///
/// Counters live for the manager's lifetime and are reset only by process
/// restart. All updates are relaxed atomics; readers get a consistent-enough
/// view for observability purposes.
#[derive(Debug, Default)]
pub struct ResilienceMetrics {
    total_operations: AtomicU64,
    failed_operations: AtomicU64,
    queued_operations: AtomicU64,
    last_response_time_ms: AtomicU64,
    circuit_breaks: AtomicU64,
    queue_depth: AtomicUsize,
}

impl ResilienceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed call through the entry point, whatever its path.
    pub fn record_operation(&self, latency: Duration) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.last_response_time_ms.store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a failed invocation of the underlying operation.
    pub fn record_failure(&self) {
        self.failed_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an operation admitted into the recovery queue.
    pub fn record_enqueue(&self) {
        self.queued_operations.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an operation taken off the queue by the drain worker.
    pub fn record_dequeue(&self) {
        let _ = self.queue_depth.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |depth| {
            depth.checked_sub(1)
        });
    }

    /// Record a circuit-breaker trip.
    pub fn record_circuit_break(&self) {
        self.circuit_breaks.fetch_add(1, Ordering::Relaxed);
    }

    /// Read-only copy of the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_operations: self.total_operations.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
            queued_operations: self.queued_operations.load(Ordering::Relaxed),
            last_response_time_ms: self.last_response_time_ms.load(Ordering::Relaxed),
            circuit_breaks: self.circuit_breaks.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the manager's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Calls made through the entry point, any path.
    pub total_operations: u64,
    /// Invocations of the underlying operation that failed.
    pub failed_operations: u64,
    /// Operations admitted into the recovery queue.
    pub queued_operations: u64,
    /// Wall-clock latency of the most recent call, in milliseconds.
    pub last_response_time_ms: u64,
    /// Times the circuit breaker tripped open.
    pub circuit_breaks: u64,
    /// Operations currently resident in the queue.
    pub queue_depth: usize,
}
