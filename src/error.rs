//! Registry error types.
//!
//! One taxonomy for the whole pipeline: startup configuration, credential
//! exchange, git transport, catalog loading, and lookups. Startup errors are
//! fatal; steady-state errors are logged and counted by the sync controller.

use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream git error: {0}")]
    Upstream(String),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("index not found: {0}")]
    NoIndex(String),

    #[error("malformed index: {0}")]
    BadIndex(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("index not loaded")]
    Unavailable,

    #[error("deadline exceeded: {0}")]
    Deadline(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl From<git2::Error> for RegistryError {
    fn from(err: git2::Error) -> Self {
        RegistryError::Upstream(err.message().to_string())
    }
}
