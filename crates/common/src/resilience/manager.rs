//! Availability-aware execution manager.
//!
//! Wraps every call to an unreliable dependency (database, object storage)
//! behind a single entry point that tracks consecutive failures, trips a
//! circuit breaker, runs bounded synchronous recovery, and parks concurrent
//! callers in a bounded queue while recovery is in progress.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::config::{ConfigResult, ResilienceConfig};
use super::errors::{OperationError, ResilienceError};
use super::metrics::{MetricsSnapshot, ResilienceMetrics};
use super::queue::{self, QueuedOperation};

/// Type-erased operation, re-invokable by the recovery loop and the queue.
pub(crate) type Operation =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), OperationError>> + Send + Sync>;

/// Availability of the managed dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityState {
    /// Dependency is reachable; operations run directly.
    Healthy,
    /// Recovery is in progress; new arrivals are queued.
    Reconnecting,
    /// Recovery exhausted its retry budget; calls fail until a success.
    Failed,
    /// Breaker tripped; calls fast-fail until the cooldown elapses.
    CircuitOpen,
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
            Self::CircuitOpen => "circuit_open",
        };
        f.write_str(name)
    }
}

/// State shared between the manager handle and its background workers.
pub(crate) struct Shared<C: Clock> {
    pub(crate) config: ResilienceConfig,
    state: RwLock<AvailabilityState>,
    failure_count: AtomicU32,
    last_failure: RwLock<Option<Instant>>,
    pub(crate) metrics: ResilienceMetrics,
    pub(crate) clock: C,
}

impl<C: Clock> Shared<C> {
    pub(crate) fn state(&self) -> AvailabilityState {
        *self.state.read()
    }

    /// Transition to `next`, logging only real changes. Returns the previous
    /// state.
    pub(crate) fn set_state(&self, next: AvailabilityState) -> AvailabilityState {
        let mut guard = self.state.write();
        let prev = *guard;
        if prev != next {
            *guard = next;
            info!(from = %prev, to = %next, "availability state changed");
        }
        prev
    }

    /// Claim the `Healthy -> Reconnecting` transition. Exactly one of the
    /// concurrent callers observing the same failure wins and runs recovery;
    /// the rest queue their operations instead.
    fn begin_recovery(&self) -> bool {
        let mut guard = self.state.write();
        if *guard == AvailabilityState::Healthy {
            *guard = AvailabilityState::Reconnecting;
            info!(
                from = %AvailabilityState::Healthy,
                to = %AvailabilityState::Reconnecting,
                "availability state changed"
            );
            true
        } else {
            false
        }
    }

    /// Record one failure: stamps the timestamp and returns the new
    /// consecutive-failure count.
    fn note_failure(&self) -> u32 {
        *self.last_failure.write() = Some(self.clock.now());
        self.failure_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn reset_failures(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Whether the circuit-open cooldown window has strictly elapsed since
    /// the last recorded failure. No recorded failure counts as elapsed.
    fn cooldown_elapsed(&self) -> bool {
        match *self.last_failure.read() {
            Some(stamp) => {
                self.clock.now().duration_since(stamp) > self.config.circuit_breaker_reset
            }
            None => true,
        }
    }

    /// Run the operation on its own task, racing the caller's cancellation.
    ///
    /// When cancellation wins, the spawned task is detached rather than
    /// aborted: the operation may still complete in the background and its
    /// result is discarded. Callers get bounded-latency cancellation; the
    /// dependency may keep doing stale work.
    pub(crate) async fn run_cancellable(
        &self,
        caller: &CancellationToken,
        operation: &Operation,
    ) -> Result<(), ResilienceError> {
        let handle = tokio::spawn((operation)());
        tokio::select! {
            _ = caller.cancelled() => Err(ResilienceError::Cancelled),
            joined = handle => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(ResilienceError::Operation(err)),
                Err(join_err) => Err(ResilienceError::Operation(Box::new(join_err))),
            },
        }
    }
}

/// Availability-aware wrapper around calls to one unreliable dependency.
///
/// One manager instance guards one dependency. All shared state lives behind
/// an `Arc` so the two background workers (queue drainer, metrics reporter)
/// outlive individual calls; the handle itself is cheap to share by
/// reference.
pub struct ResilienceManager<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
    queue_tx: mpsc::Sender<QueuedOperation>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ResilienceManager<SystemClock> {
    /// Create a manager with the real system clock and start its background
    /// workers. Must be called from within a tokio runtime.
    pub fn new(config: ResilienceConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> ResilienceManager<C> {
    /// Create a manager with an injected clock and start its background
    /// workers.
    pub fn with_clock(config: ResilienceConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let (manager, queue_rx) = Self::new_parts(config, clock);
        manager.spawn_workers(queue_rx);
        Ok(manager)
    }

    /// Build the manager without spawning workers. Unit tests use this to
    /// exercise admission behavior deterministically.
    fn new_parts(config: ResilienceConfig, clock: C) -> (Self, mpsc::Receiver<QueuedOperation>) {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let shared = Arc::new(Shared {
            config,
            state: RwLock::new(AvailabilityState::Healthy),
            failure_count: AtomicU32::new(0),
            last_failure: RwLock::new(None),
            metrics: ResilienceMetrics::new(),
            clock,
        });
        let manager = Self {
            shared,
            queue_tx,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        };
        (manager, queue_rx)
    }

    fn spawn_workers(&self, queue_rx: mpsc::Receiver<QueuedOperation>) {
        let drain = tokio::spawn(queue::drain_loop(
            Arc::clone(&self.shared),
            queue_rx,
            self.shutdown.clone(),
        ));
        let metrics = tokio::spawn(metrics_loop(Arc::clone(&self.shared), self.shutdown.clone()));
        self.workers.lock().extend([drain, metrics]);
    }

    /// Execute an operation under availability management.
    ///
    /// Returns `Ok(())` when the operation succeeded on any path, a taxonomy
    /// error describing why it did not run, or
    /// [`ResilienceError::Operation`] carrying the operation's own error when
    /// it ran and failed terminally. The closure may be invoked more than
    /// once: the recovery loop re-invokes it on each attempt.
    pub async fn execute<F, Fut>(
        &self,
        caller: &CancellationToken,
        operation: F,
    ) -> Result<(), ResilienceError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        let operation: Operation = Arc::new(move || operation().boxed());
        let started = self.shared.clock.now();
        let result = self.execute_inner(caller, &operation).await;
        self.shared
            .metrics
            .record_operation(self.shared.clock.now().duration_since(started));
        result
    }

    async fn execute_inner(
        &self,
        caller: &CancellationToken,
        operation: &Operation,
    ) -> Result<(), ResilienceError> {
        if self.shared.state() == AvailabilityState::CircuitOpen {
            if !self.shared.cooldown_elapsed() {
                return Err(ResilienceError::CircuitOpen);
            }
            debug!("circuit cooldown elapsed, admitting probe");
        }

        let prior_state = self.shared.state();
        let error = match self.shared.run_cancellable(caller, operation).await {
            Ok(()) => {
                self.shared.reset_failures();
                self.shared.set_state(AvailabilityState::Healthy);
                return Ok(());
            }
            // Cancellation is the caller giving up, not the dependency
            // failing; it never feeds the failure counter.
            Err(ResilienceError::Cancelled) => return Err(ResilienceError::Cancelled),
            Err(error) => error,
        };

        self.shared.metrics.record_failure();
        let failures = self.shared.note_failure();
        debug!(failures, error = %error, "managed operation failed");

        if failures >= self.shared.config.circuit_breaker_threshold {
            if self.shared.set_state(AvailabilityState::CircuitOpen)
                != AvailabilityState::CircuitOpen
            {
                self.shared.metrics.record_circuit_break();
                warn!(failures, "circuit breaker tripped");
            }
            return Err(ResilienceError::CircuitOpen);
        }

        match prior_state {
            AvailabilityState::Healthy => {
                if self.shared.begin_recovery() {
                    self.perform_recovery(caller, operation).await
                } else {
                    // Lost the transition race; another caller is already
                    // recovering.
                    self.enqueue(caller, operation).await
                }
            }
            AvailabilityState::Reconnecting => self.enqueue(caller, operation).await,
            _ => Err(ResilienceError::RecoveryFailed),
        }
    }

    /// Bounded synchronous recovery. The only path allowed to sleep between
    /// attempts; each iteration re-invokes the caller's operation as the
    /// recovery probe.
    async fn perform_recovery(
        &self,
        caller: &CancellationToken,
        operation: &Operation,
    ) -> Result<(), ResilienceError> {
        let max_attempts = self.shared.config.max_retries;
        for attempt in 1..=max_attempts {
            if caller.is_cancelled() {
                return Err(ResilienceError::Cancelled);
            }
            warn!(attempt, max_attempts, "attempting dependency recovery");
            tokio::select! {
                _ = caller.cancelled() => return Err(ResilienceError::Cancelled),
                _ = tokio::time::sleep(self.shared.config.retry_interval) => {}
            }
            match self.shared.run_cancellable(caller, operation).await {
                Ok(()) => {
                    self.shared.reset_failures();
                    self.shared.set_state(AvailabilityState::Healthy);
                    info!(attempt, "dependency recovered");
                    return Ok(());
                }
                Err(ResilienceError::Cancelled) => return Err(ResilienceError::Cancelled),
                Err(error) => {
                    warn!(attempt, error = %error, "recovery attempt failed");
                }
            }
        }

        self.shared.set_state(AvailabilityState::Failed);
        warn!(max_attempts, "dependency recovery exhausted");
        Err(ResilienceError::RecoveryFailed)
    }

    /// Non-blocking admission into the recovery queue, then a race between
    /// the delivered result, the caller's cancellation, and the residency
    /// timeout. Exactly one of the three decides the return value.
    async fn enqueue(
        &self,
        caller: &CancellationToken,
        operation: &Operation,
    ) -> Result<(), ResilienceError> {
        let (result_tx, result_rx) = oneshot::channel();
        let entry = QueuedOperation {
            operation: Arc::clone(operation),
            result_tx,
            caller: caller.clone(),
            enqueued_at: self.shared.clock.now(),
        };

        match self.queue_tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("operation queue at capacity, rejecting");
                return Err(ResilienceError::QueueFull);
            }
            // The drain worker has exited; the manager is shut down.
            Err(TrySendError::Closed(_)) => return Err(ResilienceError::NotHealthy),
        }
        self.shared.metrics.record_enqueue();
        debug!("operation queued while recovery in progress");

        tokio::select! {
            delivered = result_rx => match delivered {
                Ok(result) => result,
                // Sender dropped during shutdown before a terminal write.
                Err(_) => Err(ResilienceError::Cancelled),
            },
            _ = caller.cancelled() => Err(ResilienceError::Cancelled),
            _ = tokio::time::sleep(self.shared.config.queue_timeout) => {
                Err(ResilienceError::QueueTimeout)
            }
        }
    }

    /// Current availability state.
    pub fn state(&self) -> AvailabilityState {
        self.shared.state()
    }

    /// Read-only copy of the current metrics counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Stop both background workers and wait for them, bounded by the
    /// configured join timeout. Idempotent; later calls find no workers left
    /// to join.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock();
            workers.drain(..).collect()
        };
        for handle in handles {
            match tokio::time::timeout(self.shared.config.close_join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "background worker terminated abnormally"),
                Err(_) => warn!("background worker did not stop within join timeout"),
            }
        }
        debug!("resilience manager closed");
    }
}

impl<C: Clock> Drop for ResilienceManager<C> {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() && !self.workers.lock().is_empty() {
            warn!("resilience manager dropped without close(), cancelling workers");
            self.shutdown.cancel();
        }
    }
}

/// Background metrics reporter. Pure observability; nothing depends on it.
async fn metrics_loop<C: Clock>(shared: Arc<Shared<C>>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.metrics_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it so the first report
    // lands one full period after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("metrics reporter stopping");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = shared.metrics.snapshot();
                info!(
                    state = %shared.state(),
                    total_operations = snapshot.total_operations,
                    failed_operations = snapshot.failed_operations,
                    queued_operations = snapshot.queued_operations,
                    queue_depth = snapshot.queue_depth,
                    circuit_breaks = snapshot.circuit_breaks,
                    last_response_time_ms = snapshot.last_response_time_ms,
                    "resilience metrics"
                );
            }
        }
    }
}
