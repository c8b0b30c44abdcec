//! Infrastructure error types
//!
//! One enum for everything the infra crate can fail with, composing the
//! resilience taxonomy from `snipvault-common` with client-specific causes.

use snipvault_common::resilience::{ConfigError, ResilienceError};
use thiserror::Error;

/// Errors produced by the infrastructure clients.
#[derive(Debug, Error)]
pub enum InfraError {
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The resilience manager refused or failed the operation.
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    /// An HTTP request could not be built or sent.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The storage gateway answered with a non-success status.
    #[error("storage gateway returned {status}: {message}")]
    Storage { status: u16, message: String },

    /// A database call failed outside the managed path.
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),
}

impl From<ConfigError> for InfraError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl InfraError {
    /// Whether the failure is worth surfacing as transient-unavailable
    /// rather than a hard error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Resilience(err) => err.is_transient(),
            Self::Storage { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result alias used throughout the infra crate.
pub type InfraResult<T> = Result<T, InfraError>;
