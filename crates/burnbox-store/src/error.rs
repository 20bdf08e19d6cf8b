//! Backend error conversion

use burnbox_core::StoreError;
use thiserror::Error;

/// Failures raised by the underlying storage libraries
#[derive(Debug, Error)]
pub enum BackendError {
    /// sled failure
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    /// SQLite failure
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record encoding failure
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),

    /// Blocking task failure
    #[error("task: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Map any backend library error into a [`StoreError::Backend`]
pub(crate) fn backend<E: Into<BackendError>>(err: E) -> StoreError {
    let err: BackendError = err.into();
    err.into()
}
