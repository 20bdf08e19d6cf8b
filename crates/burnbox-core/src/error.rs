//! Error types for Burnbox core

use std::time::Duration;

use thiserror::Error;

use crate::message::Message;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by the pluggable crypter and pin hasher
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message processing errors.
///
/// Every variant except [`Error::Store`] is driven by user input and maps
/// deterministically onto a response code in the calling layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Empty pin, exhausted attempts, or a failed decrypt
    #[error("wrong pin")]
    BadPin,

    /// Wrong pin, the message survives for another try
    #[error("wrong pin attempt ({attempts} so far)")]
    BadPinAttempt {
        /// Failed attempts recorded for this message
        attempts: u32,
        /// The still-encrypted record
        message: Box<Message>,
    },

    /// Requested lifetime exceeds the configured maximum
    #[error("bad duration: {requested:?} exceeds maximum {max:?}")]
    BadDuration {
        /// Lifetime the caller asked for
        requested: Duration,
        /// Configured maximum
        max: Duration,
    },

    /// File name failed validation
    #[error("invalid file name")]
    BadFileName,

    /// Content type failed validation
    #[error("invalid content type")]
    BadContentType,

    /// File payload too large
    #[error("file too large: {size} bytes exceeds maximum {max}")]
    FileTooLarge {
        /// Payload size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Encryption failed
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Hashing or key generation failed
    #[error("internal error: {0}")]
    Internal(String),

    /// Message expired
    #[error("message expired")]
    Expired,

    /// Message absent or already removed
    #[error("message not found")]
    NotFound,

    /// Storage infrastructure failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Whether the caller may try again with another pin
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BadPinAttempt { .. })
    }
}

/// Storage engine errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Message could not be persisted
    #[error("can't save message: {0}")]
    SaveRejected(String),

    /// Message absent, expired and swept, or deleted
    #[error("message expired or deleted")]
    LoadRejected,

    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Store already closed
    #[error("store closed")]
    Closed,
}
