//! Error taxonomy for managed operations.
//!
//! Every failure mode has a sentinel variant describing *why* the operation
//! did not run; when the operation did run and failed, its own error is
//! carried verbatim in [`ResilienceError::Operation`]. Nothing is swallowed
//! silently.

use thiserror::Error;

/// Boxed error type produced by caller-supplied operations.
pub type OperationError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`ResilienceManager::execute`].
///
/// [`ResilienceManager::execute`]: super::ResilienceManager::execute
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Admission rejected, the recovery queue is at capacity.
    #[error("operation queue is full")]
    QueueFull,

    /// The operation waited in the queue past its residency limit.
    #[error("operation timed out waiting in queue")]
    QueueTimeout,

    /// A queued operation was dequeued while the dependency was still
    /// known-bad; it was never invoked.
    #[error("dependency not healthy")]
    NotHealthy,

    /// Fast-fail while the breaker is tripped and the cooldown has not
    /// elapsed.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Synchronous recovery exhausted its retry budget.
    #[error("dependency recovery failed")]
    RecoveryFailed,

    /// The caller's cancellation token fired before the operation resolved.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation ran and failed; its error is propagated verbatim.
    #[error("operation failed: {0}")]
    Operation(#[source] OperationError),
}

impl ResilienceError {
    /// Whether the underlying operation was never invoked on this path.
    ///
    /// `QueueTimeout` counts as a rejection: the result of any late execution
    /// is discarded and never delivered to the caller.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::QueueFull
                | Self::QueueTimeout
                | Self::NotHealthy
                | Self::CircuitOpen
                | Self::RecoveryFailed
        )
    }

    /// Whether the caller may reasonably re-invoke `execute` later.
    ///
    /// The manager itself never retries beyond the bounded recovery loop;
    /// this is a hint for callers mapping errors to transient-unavailable
    /// responses. Exactly the rejection set qualifies: a rejected operation
    /// never reached the dependency, while `Cancelled` means the caller gave
    /// up and `Operation` carries a definitive answer.
    pub fn is_transient(&self) -> bool {
        self.is_rejection()
    }
}
