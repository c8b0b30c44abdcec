//! # snipvault Infrastructure
//!
//! Resilience-managed clients for the backend's external dependencies.
//!
//! This crate contains:
//! - Postgres client wrapper (`database`)
//! - Object-storage gateway client (`storage`)
//! - Environment-driven configuration loading (`config`)
//! - The value-returning bridge over the resilience entry point (`managed`)
//!
//! ## Architecture
//! - Every external call runs through a `ResilienceManager` from
//!   `snipvault-common`
//! - One manager instance per dependency; clients hold it by `Arc`
//! - Contains all "impure" code (network I/O, environment access)

pub mod config;
pub mod database;
pub mod errors;
pub mod managed;
pub mod storage;

// Re-export commonly used items
pub use config::{InfraConfig, StorageConfig};
pub use database::DatabaseClient;
pub use errors::{InfraError, InfraResult};
pub use managed::run_managed;
pub use storage::{ObjectEntry, StorageClient};
