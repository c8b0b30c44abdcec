//! Shared resilience library for snipvault services.
//!
//! Currently hosts one subsystem: the availability-aware execution manager
//! in [`resilience`], which every external-dependency client in the backend
//! routes its calls through.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;

pub use resilience::{
    AvailabilityState, Clock, MetricsSnapshot, MockClock, OperationError, ResilienceConfig,
    ResilienceError, ResilienceManager, SystemClock,
};
