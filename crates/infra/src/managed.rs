//! Value-returning bridge over the unit-returning resilience entry point.
//!
//! `ResilienceManager::execute` only reports success or failure; concrete
//! clients need the operation's output. `run_managed` threads the value out
//! through a shared slot written by whichever invocation finally succeeds
//! (the recovery loop may invoke the closure several times).

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use snipvault_common::resilience::{Clock, OperationError, ResilienceError, ResilienceManager};
use tokio_util::sync::CancellationToken;

/// Run a value-producing operation under the manager.
///
/// The closure may be invoked more than once; only the successful
/// invocation's value is kept. On any manager rejection the value slot is
/// discarded untouched.
pub async fn run_managed<C, T, F, Fut>(
    manager: &ResilienceManager<C>,
    caller: &CancellationToken,
    operation: F,
) -> Result<T, ResilienceError>
where
    C: Clock,
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
{
    let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
    let writer = Arc::clone(&slot);

    manager
        .execute(caller, move || {
            let slot = Arc::clone(&writer);
            let work = operation();
            async move {
                let value = work.await?;
                *slot.lock() = Some(value);
                Ok(())
            }
        })
        .await?;

    let value = slot.lock().take();
    value.ok_or_else(|| ResilienceError::Operation("managed operation produced no value".into()))
}
