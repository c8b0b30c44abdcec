//! Availability management for unreliable external dependencies.
//!
//! One [`ResilienceManager`] guards one dependency (the database, the object
//! store) and routes every call to it through a single entry point that
//! combines:
//! - a four-state availability machine (healthy, reconnecting, failed,
//!   circuit-open),
//! - a consecutive-failure circuit breaker with a cooldown window,
//! - bounded synchronous recovery run by the first caller that observes a
//!   failure,
//! - a bounded queue that parks concurrent callers while recovery is in
//!   progress instead of letting each retry independently,
//! - cancellation-aware execution of every operation.
//!
//! The manager does not deduplicate concurrently-identical operations; two
//! callers queuing the same logical call both execute. Keyed single-flight
//! collapsing would be a separate layer on top.

pub mod clock;
pub mod config;
pub mod errors;
pub mod manager;
pub mod metrics;

mod queue;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ConfigError, ConfigResult, ResilienceConfig, ResilienceConfigBuilder};
pub use errors::{OperationError, ResilienceError};
pub use manager::{AvailabilityState, ResilienceManager};
pub use metrics::{MetricsSnapshot, ResilienceMetrics};
